//! Submission assembly and fire-and-forget delivery.

use chrono::{DateTime, SecondsFormat};
use formwatch_common::{ChannelError, DeliveryMessage, FieldMap, Submission, SubmissionSource};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info};

/// The one-way delivery channel to the rest of the extension.
pub trait DeliveryChannel {
    fn send(&self, message: &DeliveryMessage) -> Result<(), ChannelError>;
}

impl<T: DeliveryChannel + ?Sized> DeliveryChannel for Rc<T> {
    fn send(&self, message: &DeliveryMessage) -> Result<(), ChannelError> {
        (**self).send(message)
    }
}

/// Records every message; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    messages: Rc<RefCell<Vec<DeliveryMessage>>>,
    closed: Rc<RefCell<bool>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<DeliveryMessage> {
        self.messages.borrow().clone()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.messages
            .borrow()
            .iter()
            .map(|m| m.submission().clone())
            .collect()
    }

    /// Make every later send fail, like an invalidated extension context.
    pub fn close(&self) {
        *self.closed.borrow_mut() = true;
    }
}

impl DeliveryChannel for MemoryChannel {
    fn send(&self, message: &DeliveryMessage) -> Result<(), ChannelError> {
        if *self.closed.borrow() {
            return Err(ChannelError::ContextInvalidated);
        }
        self.messages.borrow_mut().push(message.clone());
        Ok(())
    }
}

pub struct SubmissionBuilder {
    source: SubmissionSource,
    fields: FieldMap,
    url: String,
    action: Option<String>,
    title: String,
    epoch_ms: i64,
}

impl SubmissionBuilder {
    pub fn new(source: SubmissionSource, fields: FieldMap) -> Self {
        Self {
            source,
            fields,
            url: String::new(),
            action: None,
            title: String::new(),
            epoch_ms: 0,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Blank actions fall back to the page URL.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        let action = action.into();
        self.action = (!action.trim().is_empty()).then_some(action);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn timestamp_ms(mut self, epoch_ms: i64) -> Self {
        self.epoch_ms = epoch_ms;
        self
    }

    pub fn build(self) -> Submission {
        let timestamp = DateTime::from_timestamp_millis(self.epoch_ms)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        Submission {
            action: self.action.unwrap_or_else(|| self.url.clone()),
            url: self.url,
            timestamp,
            title: self.title,
            fields: self.fields,
            source: self.source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// An identical submission went out inside the duplicate window.
    Duplicate,
    /// The channel refused the message; it is dropped.
    ChannelFailed,
}

struct RecentSend {
    at_ms: u64,
    source: SubmissionSource,
    action: String,
    fields: FieldMap,
}

pub struct Dispatcher<C> {
    channel: C,
    window_ms: u64,
    recent: Vec<RecentSend>,
    sent: usize,
}

impl<C: DeliveryChannel> Dispatcher<C> {
    pub fn new(channel: C, window_ms: u64) -> Self {
        Self {
            channel,
            window_ms,
            recent: Vec::new(),
            sent: 0,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Submissions handed to the channel successfully.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Hand `submission` to the channel once. Never fails and never retries.
    pub fn dispatch(&mut self, submission: Submission, now_ms: u64) -> DispatchOutcome {
        let window = self.window_ms;
        self.recent.retain(|r| now_ms.saturating_sub(r.at_ms) < window);
        if self.recent.iter().any(|r| {
            r.source == submission.source
                && r.action == submission.action
                && r.fields == submission.fields
        }) {
            debug!(
                "Suppressing duplicate {} submission to {}",
                submission.source, submission.action
            );
            return DispatchOutcome::Duplicate;
        }

        let recent = RecentSend {
            at_ms: now_ms,
            source: submission.source,
            action: submission.action.clone(),
            fields: submission.fields.clone(),
        };
        let field_count = submission.fields.len();
        let source = submission.source;
        let message = DeliveryMessage::FormSubmission { data: submission };
        match self.channel.send(&message) {
            Ok(()) => {
                info!("Captured {} submission ({} fields)", source, field_count);
                self.recent.push(recent);
                self.sent += 1;
                DispatchOutcome::Sent
            }
            Err(e) => {
                debug!("Delivery channel unavailable, dropping submission: {}", e);
                DispatchOutcome::ChannelFailed
            }
        }
    }
}
