pub mod dispatch;
pub mod dom;
pub mod engine;
pub mod extract;
pub mod ignore;
pub mod network;
pub mod provider;
pub mod retry;
pub mod timers;
pub mod watcher;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use dispatch::{DeliveryChannel, DispatchOutcome, Dispatcher, MemoryChannel, SubmissionBuilder};
pub use dom::{Dom, DomError, MemoryDom, NodeId, NodeSpec, PageSpec};
pub use engine::{CaptureEngine, SharedEngine, Task};
pub use extract::{GenericExtractor, ProviderExtractor, extractor_for};
pub use ignore::IgnorePolicy;
pub use network::{ObservedRequest, RequestBody, classify_request};
pub use provider::{ProviderKind, classify};
pub use retry::{RetryPolicy, RetryScheduler, RetryStep};
pub use timers::{Clock, ManualClock, TimerQueue};
pub use watcher::SubmitTriggerWatcher;

#[cfg(not(target_arch = "wasm32"))]
pub use timers::SystemClock;

#[cfg(target_arch = "wasm32")]
pub use wasm::*;
