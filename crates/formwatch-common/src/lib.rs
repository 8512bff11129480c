pub mod config;
pub mod error;
pub mod protocol;

pub use config::CaptureConfig;
pub use error::ChannelError;
pub use protocol::{
    DeliveryMessage, FieldMap, FieldValue, ProviderKind, Submission, SubmissionSource,
    TriggerSource,
};
