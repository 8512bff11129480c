use thiserror::Error;

/// Failures reported by a delivery channel. The dispatcher logs and drops them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Delivery channel closed")]
    Closed,

    #[error("Extension context invalidated")]
    ContextInvalidated,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Channel error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        ChannelError::Serialization(err.to_string())
    }
}
