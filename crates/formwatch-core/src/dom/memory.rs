//! Arena-backed document used by tests and by the fixture replayer.

use super::selector::{ElementView, Selector};
use super::{ControlState, Dom, DomError, ListenerKind, NodeId, PageLocation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Declarative node description, the shape used by JSON fixtures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Live `value` property, overriding the `value` attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Live `checked`/`selected` property, overriding the attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default)]
    pub files: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn files(mut self, count: usize) -> Self {
        self.files = count;
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }
}

/// Page-level fixture: location, title, body tree and page globals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSpec {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Vec<NodeSpec>,
    #[serde(default)]
    pub globals: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
struct MemoryNode {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: Option<String>,
    value: Option<String>,
    checked: Option<bool>,
    files: usize,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    detached: bool,
}

#[derive(Debug, Clone)]
pub struct MemoryDom {
    url: String,
    title: String,
    nodes: Vec<MemoryNode>,
    root: NodeId,
    globals: HashMap<String, Value>,
    listeners: HashMap<NodeId, Vec<ListenerKind>>,
    mutations: u64,
}

impl MemoryDom {
    pub fn new(url: &str, title: &str) -> Self {
        let root = MemoryNode {
            tag: "body".to_string(),
            attrs: BTreeMap::new(),
            text: None,
            value: None,
            checked: None,
            files: 0,
            parent: None,
            children: Vec::new(),
            detached: false,
        };
        Self {
            url: url.to_string(),
            title: title.to_string(),
            nodes: vec![root],
            root: 0,
            globals: HashMap::new(),
            listeners: HashMap::new(),
            mutations: 0,
        }
    }

    pub fn from_page(page: &PageSpec) -> Self {
        let mut dom = Self::new(&page.url, &page.title);
        for spec in &page.body {
            dom.append(dom.root, spec.clone());
        }
        dom.globals = page.globals.clone();
        dom.mutations = 0;
        dom
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    /// Append `spec` (and its subtree) under `parent`, returning the new node.
    pub fn append(&mut self, parent: NodeId, spec: NodeSpec) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(MemoryNode {
            tag: spec.tag.to_lowercase(),
            attrs: spec
                .attrs
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            text: spec.text,
            value: spec.value,
            checked: spec.checked,
            files: spec.files,
            parent: Some(parent),
            children: Vec::new(),
            detached: false,
        });
        if let Some(p) = self.nodes.get_mut(parent as usize) {
            p.children.push(id);
        }
        for child in spec.children {
            self.append(id, child);
        }
        self.mutations += 1;
        id
    }

    /// Detach `node` and its subtree. Later reads report `DomError::Detached`.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes.get(node as usize).and_then(|n| n.parent) {
            if let Some(p) = self.nodes.get_mut(parent as usize) {
                p.children.retain(|c| *c != node);
            }
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.get_mut(id as usize) {
                n.detached = true;
                stack.extend(n.children.iter().copied());
            }
        }
        self.mutations += 1;
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.nodes.get_mut(node as usize) {
            n.attrs.insert(name.to_lowercase(), value.to_string());
            self.mutations += 1;
        }
    }

    pub fn set_value(&mut self, node: NodeId, value: &str) {
        if let Some(n) = self.nodes.get_mut(node as usize) {
            n.value = Some(value.to_string());
        }
    }

    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        if let Some(n) = self.nodes.get_mut(node as usize) {
            n.checked = Some(checked);
        }
    }

    /// Listeners attached to `node`, in attachment order.
    pub fn listeners(&self, node: NodeId) -> &[ListenerKind] {
        self.listeners.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Number of structural mutations since construction.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    fn node(&self, id: NodeId) -> Result<&MemoryNode, DomError> {
        let node = self
            .nodes
            .get(id as usize)
            .ok_or(DomError::MissingNode(id))?;
        if node.detached {
            return Err(DomError::Detached(id));
        }
        Ok(node)
    }

    fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .get(scope as usize)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(n) = self.nodes.get(id as usize) {
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id as usize) else {
            return;
        };
        if let Some(text) = &node.text {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(text);
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    fn is_checked(&self, node: &MemoryNode) -> bool {
        match node.checked {
            Some(checked) => checked,
            None if node.tag == "option" => node.attrs.contains_key("selected"),
            None => node.attrs.contains_key("checked"),
        }
    }

    fn option_value(&self, id: NodeId) -> String {
        let Some(node) = self.nodes.get(id as usize) else {
            return String::new();
        };
        if let Some(value) = node.value.clone().or_else(|| node.attrs.get("value").cloned()) {
            return value;
        }
        let mut text = String::new();
        self.collect_text(id, &mut text);
        text.trim().to_string()
    }
}

impl ElementView for MemoryDom {
    fn tag_of(&self, node: NodeId) -> Option<&str> {
        self.nodes
            .get(node as usize)
            .filter(|n| !n.detached)
            .map(|n| n.tag.as_str())
    }

    fn attr_of(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(node as usize)?
            .attrs
            .get(name)
            .map(|v| v.as_str())
    }

    fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node as usize)?.parent
    }
}

impl Dom for MemoryDom {
    fn location(&self) -> Result<PageLocation, DomError> {
        Ok(PageLocation::parse(&self.url))
    }

    fn title(&self) -> Result<String, DomError> {
        Ok(self.title.clone())
    }

    fn query_all(&self, scope: Option<NodeId>, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let parsed = Selector::parse(selector)?;
        let scope = match scope {
            Some(id) => {
                self.node(id)?;
                id
            }
            None => self.root,
        };
        Ok(self
            .descendants(scope)
            .into_iter()
            .filter(|id| parsed.matches(self, *id))
            .collect())
    }

    fn matches(&self, node: NodeId, selector: &str) -> Result<bool, DomError> {
        self.node(node)?;
        Ok(Selector::parse(selector)?.matches(self, node))
    }

    fn parent(&self, node: NodeId) -> Result<Option<NodeId>, DomError> {
        let n = self.node(node)?;
        Ok(n.parent.filter(|p| *p != self.root))
    }

    fn tag_name(&self, node: NodeId) -> Result<String, DomError> {
        Ok(self.node(node)?.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError> {
        Ok(self.node(node)?.attrs.get(&name.to_lowercase()).cloned())
    }

    fn control(&self, node: NodeId) -> Result<ControlState, DomError> {
        let n = self.node(node)?;
        let input_type = match n.tag.as_str() {
            "input" => n
                .attrs
                .get("type")
                .map(|t| t.to_lowercase())
                .unwrap_or_else(|| "text".to_string()),
            "select" if n.attrs.contains_key("multiple") => "select-multiple".to_string(),
            "select" => "select-one".to_string(),
            "textarea" => "textarea".to_string(),
            "button" => n
                .attrs
                .get("type")
                .map(|t| t.to_lowercase())
                .unwrap_or_else(|| "submit".to_string()),
            _ => String::new(),
        };

        let selected: Vec<String> = if n.tag == "select" {
            let options: Vec<NodeId> = self
                .descendants(node)
                .into_iter()
                .filter(|id| self.nodes[*id as usize].tag == "option")
                .collect();
            let chosen: Vec<String> = options
                .iter()
                .filter(|id| self.is_checked(&self.nodes[**id as usize]))
                .map(|id| self.option_value(*id))
                .collect();
            if chosen.is_empty() && !n.attrs.contains_key("multiple") {
                options.first().map(|id| self.option_value(*id)).into_iter().collect()
            } else {
                chosen
            }
        } else {
            Vec::new()
        };

        let value = match n.tag.as_str() {
            "select" => selected.first().cloned().unwrap_or_default(),
            "textarea" => n.value.clone().or_else(|| n.text.clone()).unwrap_or_default(),
            _ => n
                .value
                .clone()
                .or_else(|| n.attrs.get("value").cloned())
                .unwrap_or_default(),
        };

        Ok(ControlState {
            input_type,
            value,
            checked: self.is_checked(n),
            disabled: n.attrs.contains_key("disabled"),
            multiple: n.attrs.contains_key("multiple"),
            file_count: n.files,
            selected,
        })
    }

    fn text_content(&self, node: NodeId) -> Result<String, DomError> {
        self.node(node)?;
        let mut out = String::new();
        self.collect_text(node, &mut out);
        Ok(out)
    }

    fn read_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    fn attach_listener(&mut self, node: NodeId, kind: ListenerKind) -> Result<(), DomError> {
        self.node(node)?;
        self.listeners.entry(node).or_default().push(kind);
        Ok(())
    }
}
