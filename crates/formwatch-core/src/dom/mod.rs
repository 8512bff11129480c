//! Document access abstraction.
//!
//! The capture engine never holds host node references. It works on opaque
//! [`NodeId`] handles and reads everything through [`Dom`], so the same
//! extraction logic runs against the live page (see `wasm.rs`) and against
//! [`MemoryDom`] in tests and fixture replays.
//!
//! Every read is fallible. A node that was removed between discovery and
//! access reports [`DomError::Detached`]; callers treat any error as "no data
//! from this element".

pub mod memory;
pub mod selector;

pub use memory::{MemoryDom, NodeSpec, PageSpec};
pub use selector::{Selector, SelectorError};

use serde_json::Value;
use thiserror::Error;

pub type NodeId = u32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("Node {0} is detached from the document")]
    Detached(NodeId),

    #[error("Node {0} not found")]
    MissingNode(NodeId),

    #[error("Invalid selector: {0}")]
    Selector(#[from] SelectorError),

    #[error("Host error: {0}")]
    Host(String),
}

/// Page location, split the way the provider classifier needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub href: String,
    pub hostname: String,
    pub pathname: String,
}

impl PageLocation {
    pub fn parse(href: &str) -> Self {
        match url::Url::parse(href) {
            Ok(parsed) => Self {
                href: href.to_string(),
                hostname: parsed.host_str().unwrap_or_default().to_lowercase(),
                pathname: parsed.path().to_string(),
            },
            Err(_) => Self {
                href: href.to_string(),
                hostname: String::new(),
                pathname: String::new(),
            },
        }
    }
}

/// Live state of a form control, as the browser reports its properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    /// Lowercased `type` property; empty for non-input elements.
    pub input_type: String,
    pub value: String,
    pub checked: bool,
    pub disabled: bool,
    pub multiple: bool,
    pub file_count: usize,
    /// Values of selected `<option>` elements (select controls only).
    pub selected: Vec<String>,
}

/// Listener kinds the watcher installs on submit-like controls.
/// Both are registered in the capture phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Click,
    Press,
}

pub trait Dom {
    fn location(&self) -> Result<PageLocation, DomError>;

    fn title(&self) -> Result<String, DomError>;

    /// All elements under `scope` (or the whole document) matching `selector`,
    /// in document order. `scope` itself is not included.
    fn query_all(&self, scope: Option<NodeId>, selector: &str) -> Result<Vec<NodeId>, DomError>;

    fn matches(&self, node: NodeId, selector: &str) -> Result<bool, DomError>;

    fn parent(&self, node: NodeId) -> Result<Option<NodeId>, DomError>;

    /// Lowercased tag name.
    fn tag_name(&self, node: NodeId) -> Result<String, DomError>;

    fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError>;

    fn control(&self, node: NodeId) -> Result<ControlState, DomError>;

    fn text_content(&self, node: NodeId) -> Result<String, DomError>;

    /// JSON snapshot of a page-global object, if the page exposes one under
    /// `name` and it can be serialized.
    fn read_global(&self, name: &str) -> Option<Value>;

    fn attach_listener(&mut self, node: NodeId, kind: ListenerKind) -> Result<(), DomError>;

    fn query(&self, scope: Option<NodeId>, selector: &str) -> Result<Option<NodeId>, DomError> {
        Ok(self.query_all(scope, selector)?.into_iter().next())
    }

    /// Nearest inclusive ancestor matching `selector`.
    fn closest(&self, node: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.matches(id, selector)? {
                return Ok(Some(id));
            }
            current = self.parent(id)?;
        }
        Ok(None)
    }

    /// Non-empty attribute value, trimmed.
    fn attr_text(&self, node: NodeId, name: &str) -> Option<String> {
        self.attribute(node, name)
            .ok()
            .flatten()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Whitespace-collapsed text content, or `None` when blank.
    fn visible_text(&self, node: NodeId) -> Option<String> {
        let text = self.text_content(node).ok()?;
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (!collapsed.is_empty()).then_some(collapsed)
    }
}
