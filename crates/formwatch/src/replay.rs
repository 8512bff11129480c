//! Replays a recorded page through the capture engine.
//!
//! A fixture is a page snapshot plus a timeline of host notifications. The
//! replayer plays the role of the browser: it owns the document and the clock,
//! applies each event, forwards it to the engine and collects whatever the
//! engine delivers.

use formwatch_common::{CaptureConfig, DeliveryMessage};
use formwatch_core::dom::ListenerKind;
use formwatch_core::network::FormDataValue;
use formwatch_core::{
    CaptureEngine, Clock, Dom, DomError, ManualClock, MemoryChannel, MemoryDom, NodeId, NodeSpec,
    ObservedRequest, PageSpec, RequestBody,
};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read fixture: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse fixture: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("No node matches {0:?}")]
    NoMatch(String),
    #[error(transparent)]
    Dom(#[from] DomError),
}

fn default_settle_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub page: PageSpec,
    #[serde(default)]
    pub events: Vec<Event>,
    /// Wall-clock time at virtual time zero.
    #[serde(default)]
    pub epoch_ms: Option<i64>,
    /// Virtual time allowed after the last event for pending retries.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// A node reference inside a fixture: a selector or a raw node id.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Node(NodeId),
    Selector(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureBody {
    Text(String),
    FormData(Vec<(String, String)>),
    /// A multipart entry that carries a file.
    File { field: String, name: String },
    Opaque,
}

impl From<&FixtureBody> for RequestBody {
    fn from(body: &FixtureBody) -> Self {
        match body {
            FixtureBody::Text(text) => RequestBody::Text(text.clone()),
            FixtureBody::FormData(entries) => RequestBody::FormData(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), FormDataValue::Text(v.clone())))
                    .collect(),
            ),
            FixtureBody::File { field, name } => RequestBody::FormData(vec![(
                field.clone(),
                FormDataValue::File { name: name.clone() },
            )]),
            FixtureBody::Opaque => RequestBody::Opaque,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A `submit` event on a form.
    Submit { target: Target },
    Click { target: Target },
    Press { target: Target },
    Request {
        #[serde(default = "default_method")]
        method: String,
        url: String,
        #[serde(default)]
        body: Option<FixtureBody>,
    },
    Append {
        #[serde(default)]
        parent: Option<Target>,
        node: NodeSpec,
    },
    SetValue { target: Target, value: String },
    SetChecked { target: Target, checked: bool },
    Remove { target: Target },
    /// Same-document navigation.
    Navigate {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    Advance { ms: u64 },
}

fn default_method() -> String {
    "POST".to_string()
}

pub struct Replayer {
    engine: CaptureEngine<MemoryDom, ManualClock, MemoryChannel>,
    clock: ManualClock,
    channel: MemoryChannel,
}

impl Replayer {
    pub fn new(page: &PageSpec, config: CaptureConfig, epoch_ms: Option<i64>) -> Self {
        let clock = epoch_ms.map(ManualClock::new).unwrap_or_default();
        let channel = MemoryChannel::new();
        let mut engine = CaptureEngine::new(
            MemoryDom::from_page(page),
            clock.clone(),
            channel.clone(),
            config,
        );
        engine.start();
        Self {
            engine,
            clock,
            channel,
        }
    }

    pub fn engine(&self) -> &CaptureEngine<MemoryDom, ManualClock, MemoryChannel> {
        &self.engine
    }

    pub fn messages(&self) -> Vec<DeliveryMessage> {
        self.channel.messages()
    }

    pub fn apply(&mut self, event: &Event) -> Result<(), ReplayError> {
        match event {
            Event::Submit { target } => {
                let node = self.resolve(target)?;
                self.engine.on_submit(node);
            }
            Event::Click { target } => {
                let node = self.resolve(target)?;
                if self.is_watched(node, ListenerKind::Click) {
                    self.engine.on_click(node);
                } else {
                    debug!("Click on unwatched node {}", node);
                }
            }
            Event::Press { target } => {
                let node = self.resolve(target)?;
                if self.is_watched(node, ListenerKind::Press) {
                    self.engine.on_press(node);
                } else {
                    debug!("Press on unwatched node {}", node);
                }
            }
            Event::Request { method, url, body } => {
                let request = ObservedRequest::new(method, url, body.as_ref().map(RequestBody::from));
                self.engine.on_request(&request);
            }
            Event::Append { parent, node } => {
                let parent = match parent {
                    Some(target) => self.resolve(target)?,
                    None => self.engine.dom().root(),
                };
                self.engine.dom_mut().append(parent, node.clone());
                self.engine.on_mutation();
            }
            Event::SetValue { target, value } => {
                let node = self.resolve(target)?;
                self.engine.dom_mut().set_value(node, value);
                self.engine.on_mutation();
            }
            Event::SetChecked { target, checked } => {
                let node = self.resolve(target)?;
                self.engine.dom_mut().set_checked(node, *checked);
                self.engine.on_mutation();
            }
            Event::Remove { target } => {
                let node = self.resolve(target)?;
                self.engine.dom_mut().remove(node);
                self.engine.on_mutation();
            }
            Event::Navigate { url, title } => {
                let dom = self.engine.dom_mut();
                dom.set_url(url);
                if let Some(title) = title {
                    dom.set_title(title);
                }
                self.engine.on_mutation();
            }
            Event::Advance { ms } => self.advance(*ms),
        }
        Ok(())
    }

    /// Move virtual time forward, firing each timer at its own due time.
    pub fn advance(&mut self, ms: u64) {
        let target = self.clock.now_ms() + ms;
        while let Some(due) = self.engine.next_due().filter(|due| *due <= target) {
            self.clock.set(due.max(self.clock.now_ms()));
            self.engine.run_due(due);
        }
        self.clock.set(target);
    }

    fn resolve(&self, target: &Target) -> Result<NodeId, ReplayError> {
        match target {
            Target::Node(node) => Ok(*node),
            Target::Selector(selector) => self
                .engine
                .dom()
                .query(None, selector)?
                .ok_or_else(|| ReplayError::NoMatch(selector.clone())),
        }
    }

    fn is_watched(&self, node: NodeId, kind: ListenerKind) -> bool {
        self.engine.dom().listeners(node).contains(&kind)
    }
}

/// Run a whole fixture and return every delivered message in order.
pub fn replay(fixture: &Fixture, config: CaptureConfig) -> Result<Vec<DeliveryMessage>, ReplayError> {
    let mut replayer = Replayer::new(&fixture.page, config, fixture.epoch_ms);
    debug!("Replaying {} event(s) on {}", fixture.events.len(), fixture.page.url);
    for event in &fixture.events {
        replayer.apply(event)?;
    }
    replayer.advance(fixture.settle_ms);
    Ok(replayer.messages())
}

pub async fn load_fixture(path: &Path) -> Result<Fixture, ReplayError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}
