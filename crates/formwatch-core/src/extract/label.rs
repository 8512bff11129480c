//! Question-label resolution.
//!
//! Labels come from an ordered chain of resolvers, each returning an optional
//! value. The first non-empty result wins; the caller supplies the positional
//! placeholder (`Question 3`) when the whole chain comes back empty.

use super::profile::ProviderProfile;
use crate::dom::{Dom, NodeId};

const MAX_LABEL_CHARS: usize = 200;

/// Everything a resolver may look at.
pub struct LabelScope<'a> {
    pub dom: &'a dyn Dom,
    pub node: NodeId,
    pub profile: &'a ProviderProfile,
}

pub struct LabelResolver {
    pub name: &'static str,
    pub resolve: fn(&LabelScope) -> Option<String>,
}

pub const LABEL_CHAIN: [LabelResolver; 5] = [
    LabelResolver {
        name: "container_heading",
        resolve: container_heading,
    },
    LabelResolver {
        name: "explicit_label",
        resolve: explicit_label,
    },
    LabelResolver {
        name: "aria_label",
        resolve: aria_label,
    },
    LabelResolver {
        name: "placeholder",
        resolve: |scope| scope.dom.attr_text(scope.node, "placeholder").map(clean_label),
    },
    LabelResolver {
        name: "data_attribute",
        resolve: data_attribute,
    },
];

/// Run the chain and return the first label found.
pub fn resolve_label(scope: &LabelScope) -> Option<String> {
    LABEL_CHAIN
        .iter()
        .find_map(|resolver| (resolver.resolve)(scope).filter(|label| !label.is_empty()))
}

/// Like [`resolve_label`], but also reports which resolver produced it.
pub fn resolve_label_with_source(scope: &LabelScope) -> Option<(&'static str, String)> {
    LABEL_CHAIN.iter().find_map(|resolver| {
        (resolver.resolve)(scope)
            .filter(|label| !label.is_empty())
            .map(|label| (resolver.name, label))
    })
}

pub fn positional_label(profile: &ProviderProfile, position: usize) -> String {
    format!("{} {}", profile.positional_word, position)
}

/// True when `label` is exactly the positional placeholder shape.
pub fn is_positional(profile: &ProviderProfile, label: &str) -> bool {
    label
        .strip_prefix(profile.positional_word)
        .and_then(|rest| rest.strip_prefix(' '))
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Collapse whitespace, drop question numbering and required-field markers.
pub fn clean_label(raw: impl AsRef<str>) -> String {
    let collapsed = raw.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
    let mut label = collapsed.as_str();

    if let Some((number, rest)) = label.split_once(". ") {
        if !number.is_empty() && number.len() <= 3 && number.chars().all(|c| c.is_ascii_digit()) {
            label = rest;
        }
    }
    let label = label.trim_end_matches(['*', ':', ' ']).trim();

    label.chars().take(MAX_LABEL_CHARS).collect()
}

fn container_heading(scope: &LabelScope) -> Option<String> {
    let container = scope
        .dom
        .closest(scope.node, scope.profile.container_selector)
        .ok()
        .flatten()?;
    let headings = scope
        .dom
        .query_all(Some(container), scope.profile.heading_selector)
        .ok()?;
    headings
        .into_iter()
        .filter(|h| *h != scope.node)
        .find_map(|h| scope.dom.visible_text(h))
        .map(clean_label)
}

fn explicit_label(scope: &LabelScope) -> Option<String> {
    let dom = scope.dom;
    if let Some(id) = dom.attr_text(scope.node, "id") {
        let selector = format!("label[for=\"{}\"]", id.replace('"', ""));
        if let Some(text) = dom
            .query(None, &selector)
            .ok()
            .flatten()
            .and_then(|label| dom.visible_text(label))
        {
            return Some(clean_label(text));
        }
    }
    let wrapping = dom.closest(scope.node, "label").ok().flatten()?;
    dom.visible_text(wrapping).map(clean_label)
}

fn aria_label(scope: &LabelScope) -> Option<String> {
    let dom = scope.dom;
    if let Some(label) = dom.attr_text(scope.node, "aria-label") {
        return Some(clean_label(label));
    }
    let ids = dom.attr_text(scope.node, "aria-labelledby")?;
    let text = ids
        .split_whitespace()
        .filter_map(|id| {
            let node = dom.query(None, &format!("[id=\"{}\"]", id.replace('"', ""))).ok()??;
            dom.visible_text(node)
        })
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then(|| clean_label(text))
}

fn data_attribute(scope: &LabelScope) -> Option<String> {
    scope
        .profile
        .label_attributes
        .iter()
        .find_map(|attr| scope.dom.attr_text(scope.node, attr))
        .map(clean_label)
}
