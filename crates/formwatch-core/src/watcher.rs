//! Submit-trigger discovery.
//!
//! SaaS forms rarely fire a native `submit` event, so the engine hooks their
//! submit buttons instead. Three notification sources (the initial scan,
//! mutation callbacks and a periodic poll) all feed [`SubmitTriggerWatcher::discover`],
//! which is idempotent: a control is instrumented at most once per page.

use crate::dom::{Dom, DomError, ListenerKind, NodeId};
use formwatch_common::ProviderKind;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    Initial,
    Mutation,
    Poll,
}

/// One submit-intent heuristic. Patterns are tried in order; a control is
/// discovered by the first one it satisfies.
pub struct TriggerPattern {
    pub name: &'static str,
    /// Restrict to one provider's pages.
    pub provider: Option<ProviderKind>,
    pub selector: &'static str,
    /// When set, the control's label must be one of these words or start
    /// with one (case-insensitive).
    pub words: Option<&'static [&'static str]>,
}

const CLICKABLE: &str = "button, [role=button], input[type=button], a";

const SUBMIT_WORDS: &[&str] = &[
    "submit",
    "send",
    "enviar",
    "envoyer",
    "absenden",
    "senden",
    "invia",
    "inviare",
    "verzenden",
    "versturen",
    "wyślij",
    "gönder",
    "отправить",
    "送信",
    "提交",
];

pub const TRIGGER_PATTERNS: [TriggerPattern; 9] = [
    TriggerPattern {
        name: "submit_type",
        provider: None,
        selector: "button[type=submit], input[type=submit], input[type=image]",
        words: None,
    },
    TriggerPattern {
        name: "aria_submit",
        provider: None,
        selector: "[aria-label*=submit i], [aria-label*=send i]",
        words: None,
    },
    TriggerPattern {
        name: "google_submit",
        provider: Some(ProviderKind::GoogleForms),
        selector: "[jsname=M2UYVd], .freebirdFormviewerViewNavigationSubmitButton",
        words: None,
    },
    TriggerPattern {
        name: "microsoft_submit",
        provider: Some(ProviderKind::MicrosoftForms),
        selector: "[data-automation-id=submitButton], .office-form-bottom-button",
        words: None,
    },
    TriggerPattern {
        name: "clickup_submit",
        provider: Some(ProviderKind::ClickupForms),
        selector: "[data-test=form__submit], .cu-form__submit",
        words: None,
    },
    TriggerPattern {
        name: "google_role_button",
        provider: Some(ProviderKind::GoogleForms),
        selector: "[role=button]",
        words: Some(SUBMIT_WORDS),
    },
    TriggerPattern {
        name: "submit_text",
        provider: None,
        selector: CLICKABLE,
        words: Some(SUBMIT_WORDS),
    },
    TriggerPattern {
        name: "submit_id",
        provider: None,
        selector: "button[id*=submit i], button[class*=submit i], [role=button][class*=submit i]",
        words: None,
    },
    TriggerPattern {
        name: "send_id",
        provider: None,
        selector: "button[id*=send i], button[class*=send i]",
        words: None,
    },
];

impl TriggerPattern {
    fn applies_to(&self, provider: ProviderKind) -> bool {
        self.provider.is_none_or(|p| p == provider)
    }

    fn accepts(&self, dom: &dyn Dom, node: NodeId) -> bool {
        let Some(words) = self.words else {
            return true;
        };
        let Some(label) = control_label(dom, node) else {
            return false;
        };
        let label = label.to_lowercase();
        let first = label.split_whitespace().next().unwrap_or_default();
        words
            .iter()
            .any(|w| label == *w || first.trim_matches(|c: char| !c.is_alphanumeric()) == *w)
    }
}

/// Text a user would read on the control: visible text, or the `value` of an
/// input button.
fn control_label(dom: &dyn Dom, node: NodeId) -> Option<String> {
    if dom.tag_name(node).ok()? == "input" {
        return dom.attr_text(node, "value");
    }
    dom.visible_text(node)
}

/// Set of instrumented node identities. Entries are never removed.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    watched: HashSet<NodeId>,
}

impl WatchRegistry {
    /// Mark `node` watched; `false` if it already was.
    pub fn mark(&mut self, node: NodeId) -> bool {
        self.watched.insert(node)
    }

    pub fn is_watched(&self, node: NodeId) -> bool {
        self.watched.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SubmitTriggerWatcher {
    registry: WatchRegistry,
}

impl SubmitTriggerWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Every element on the page that looks like a submit control, in
    /// pattern order, without duplicates.
    pub fn find_candidates(&self, dom: &dyn Dom, provider: ProviderKind) -> Vec<(NodeId, &'static str)> {
        let mut found: Vec<(NodeId, &'static str)> = Vec::new();
        for pattern in TRIGGER_PATTERNS.iter().filter(|p| p.applies_to(provider)) {
            let nodes = match dom.query_all(None, pattern.selector) {
                Ok(nodes) => nodes,
                Err(e) => {
                    debug!("Trigger pattern {} failed: {}", pattern.name, e);
                    continue;
                }
            };
            for node in nodes {
                if found.iter().any(|(n, _)| *n == node) || !pattern.accepts(dom, node) {
                    continue;
                }
                found.push((node, pattern.name));
            }
        }
        found
    }

    /// Instrument every new candidate. Returns the nodes instrumented by this
    /// call.
    pub fn discover(
        &mut self,
        dom: &mut dyn Dom,
        provider: ProviderKind,
        source: DiscoverySource,
    ) -> Vec<NodeId> {
        let candidates = self.find_candidates(dom, provider);
        let mut added = Vec::new();
        for (node, pattern) in candidates {
            if self.registry.is_watched(node) {
                continue;
            }
            match self.instrument(dom, node) {
                Ok(true) => {
                    debug!("Watching control {} ({}, {:?})", node, pattern, source);
                    added.push(node);
                }
                Ok(false) => {}
                Err(e) => debug!("Could not instrument control {}: {}", node, e),
            }
        }
        added
    }

    /// Mark `node` watched, then attach click and press listeners. A node
    /// already in the registry is left alone.
    pub fn instrument(&mut self, dom: &mut dyn Dom, node: NodeId) -> Result<bool, DomError> {
        if !self.registry.mark(node) {
            return Ok(false);
        }
        dom.attach_listener(node, ListenerKind::Click)?;
        dom.attach_listener(node, ListenerKind::Press)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, NodeSpec};

    #[test]
    fn instrumenting_twice_attaches_one_pair() {
        let mut dom = MemoryDom::new("https://example.com/", "");
        let button = dom.append(dom.root(), NodeSpec::new("button").text("Submit"));
        let mut watcher = SubmitTriggerWatcher::new();
        assert_eq!(watcher.instrument(&mut dom, button), Ok(true));
        assert_eq!(watcher.instrument(&mut dom, button), Ok(false));
        assert_eq!(dom.listeners(button), &[ListenerKind::Click, ListenerKind::Press]);
    }

    #[test]
    fn text_words_in_several_languages() {
        let mut dom = MemoryDom::new("https://example.com/", "");
        let en = dom.append(dom.root(), NodeSpec::new("a").text("Send message"));
        let es = dom.append(dom.root(), NodeSpec::new("div").attr("role", "button").text("Enviar"));
        let de = dom.append(
            dom.root(),
            NodeSpec::new("input").attr("type", "button").attr("value", "Absenden"),
        );
        dom.append(dom.root(), NodeSpec::new("button").attr("type", "button").text("Sender info"));
        dom.append(dom.root(), NodeSpec::new("a").text("Resend code"));

        let watcher = SubmitTriggerWatcher::new();
        let nodes: Vec<NodeId> = watcher
            .find_candidates(&dom, ProviderKind::Native)
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(nodes, vec![en, es, de]);
    }

    #[test]
    fn provider_patterns_only_on_their_pages() {
        let mut dom = MemoryDom::new("https://forms.office.com/r/x", "");
        let button = dom.append(
            dom.root(),
            NodeSpec::new("div").attr("data-automation-id", "submitButton"),
        );
        let watcher = SubmitTriggerWatcher::new();
        assert!(watcher.find_candidates(&dom, ProviderKind::Native).is_empty());
        assert_eq!(
            watcher.find_candidates(&dom, ProviderKind::MicrosoftForms),
            vec![(button, "microsoft_submit")]
        );
    }

    #[test]
    fn discovery_is_idempotent() {
        let mut dom = MemoryDom::new("https://example.com/", "");
        dom.append(dom.root(), NodeSpec::new("button").attr("type", "submit"));
        let mut watcher = SubmitTriggerWatcher::new();
        assert_eq!(
            watcher
                .discover(&mut dom, ProviderKind::Native, DiscoverySource::Initial)
                .len(),
            1
        );
        assert!(watcher
            .discover(&mut dom, ProviderKind::Native, DiscoverySource::Poll)
            .is_empty());
        let late = dom.append(dom.root(), NodeSpec::new("input").attr("type", "submit"));
        assert_eq!(
            watcher.discover(&mut dom, ProviderKind::Native, DiscoverySource::Mutation),
            vec![late]
        );
        assert_eq!(watcher.registry().len(), 2);
    }
}
