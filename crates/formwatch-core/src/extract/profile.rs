//! Shared document-scan algorithm for provider extractors.

use super::label::{LabelScope, positional_label, resolve_label_with_source};
use super::{ControlValue, element_value};
use crate::dom::{Dom, DomError, NodeId};
use formwatch_common::{FieldMap, ProviderKind};
use std::collections::HashSet;
use tracing::debug;

/// Elements a document scan considers.
pub const CANDIDATE_SELECTOR: &str = "input, textarea, select, [role=textbox], [role=combobox], \
     [role=listbox], [role=radio], [role=checkbox], [contenteditable=true]";

/// Provider-specific knobs for [`scan_document`].
#[derive(Debug)]
pub struct ProviderProfile {
    pub kind: ProviderKind,
    pub candidate_selector: &'static str,
    /// Nearest ancestor that represents one question.
    pub container_selector: &'static str,
    /// Label-like descendant of a question container.
    pub heading_selector: &'static str,
    /// Data attributes carrying a human-readable label.
    pub label_attributes: &'static [&'static str],
    /// Data attributes carrying a stable field identifier.
    pub id_attributes: &'static [&'static str],
    /// Word used for positional placeholders (`Question 3`).
    pub positional_word: &'static str,
    /// Bookkeeping input names that never carry user data.
    pub skip_names: &'static [&'static str],
    pub title_selectors: &'static [&'static str],
    pub fallback_title: &'static str,
    pub normalize_key: fn(&str) -> String,
}

/// Profile for pages with no recognised provider: used when a watched
/// control sits outside any `<form>`.
pub static NATIVE_PROFILE: ProviderProfile = ProviderProfile {
    kind: ProviderKind::Native,
    candidate_selector: CANDIDATE_SELECTOR,
    container_selector: "fieldset, .form-group, .form-field, .field, [role=group]",
    heading_selector: "legend, label, .label, [role=heading]",
    label_attributes: &["data-label", "title"],
    id_attributes: &["id"],
    positional_word: "Field",
    skip_names: &[],
    title_selectors: &["h1"],
    fallback_title: "",
    normalize_key: |k| k.to_string(),
};

/// Scan the whole document with `profile`'s heuristics.
///
/// A failure on one element skips that element only.
pub fn scan_document(dom: &dyn Dom, profile: &ProviderProfile) -> FieldMap {
    let mut fields = FieldMap::new();
    let candidates = match dom.query_all(None, profile.candidate_selector) {
        Ok(nodes) => nodes,
        Err(e) => {
            debug!("{} scan: candidate query failed: {}", profile.kind.as_str(), e);
            return fields;
        }
    };

    let nested = nested_candidates(dom, &candidates);
    for (index, node) in candidates.into_iter().enumerate() {
        if nested.contains(&node) {
            continue;
        }
        if let Err(e) = scan_element(dom, profile, node, index + 1, &mut fields) {
            debug!("{} scan: skipping element {}: {}", profile.kind.as_str(), node, e);
        }
    }
    fields
}

/// Candidates living inside an ARIA widget that is itself a candidate, such as
/// the text input inside a custom combobox. The widget speaks for them.
fn nested_candidates(dom: &dyn Dom, candidates: &[NodeId]) -> HashSet<NodeId> {
    let all: HashSet<NodeId> = candidates.iter().copied().collect();
    let is_widget = |node: NodeId| {
        dom.tag_name(node)
            .is_ok_and(|tag| !matches!(tag.as_str(), "input" | "select" | "textarea"))
    };
    candidates
        .iter()
        .copied()
        .filter(|node| {
            let mut current = dom.parent(*node).ok().flatten();
            while let Some(ancestor) = current {
                if all.contains(&ancestor) && is_widget(ancestor) {
                    return true;
                }
                current = dom.parent(ancestor).ok().flatten();
            }
            false
        })
        .collect()
}

fn scan_element(
    dom: &dyn Dom,
    profile: &ProviderProfile,
    node: NodeId,
    position: usize,
    fields: &mut FieldMap,
) -> Result<(), DomError> {
    let value = element_value(dom, node)?;
    if value == ControlValue::Skip {
        return Ok(());
    }

    let name = dom
        .attribute(node, "name")?
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if name
        .as_deref()
        .is_some_and(|n| profile.skip_names.contains(&n) || n.ends_with("_sentinel"))
    {
        return Ok(());
    }

    let key = field_key(dom, profile, node, name.as_deref(), position);
    let key = match &value {
        ControlValue::Text(_) => unique_key(fields, key),
        _ => key,
    };
    value.store(fields, &key);
    Ok(())
}

/// Key resolution: explicit `name`, then a provider identifier attribute,
/// then the question label, then the positional placeholder.
pub fn field_key(
    dom: &dyn Dom,
    profile: &ProviderProfile,
    node: NodeId,
    name: Option<&str>,
    position: usize,
) -> String {
    if let Some(name) = name {
        return (profile.normalize_key)(name);
    }

    if let Some(id) = profile
        .id_attributes
        .iter()
        .find_map(|attr| dom.attr_text(node, attr))
    {
        return (profile.normalize_key)(&id);
    }

    match resolve_label_with_source(&LabelScope { dom, node, profile }) {
        Some((resolver, label)) => {
            debug!("Element {} labelled by {}", node, resolver);
            label
        }
        None => positional_label(profile, position),
    }
}

/// Two distinct text controls can resolve to the same label; keep both.
fn unique_key(fields: &FieldMap, key: String) -> String {
    if !fields.contains_key(&key) {
        return key;
    }
    (2..)
        .map(|n| format!("{} ({})", key, n))
        .find(|candidate| !fields.contains_key(candidate))
        .unwrap_or(key)
}

/// Page title, then the profile's title elements, then its fixed fallback.
pub fn page_title(dom: &dyn Dom, profile: &ProviderProfile) -> String {
    if let Some(title) = dom.title().ok().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
        return title;
    }
    profile
        .title_selectors
        .iter()
        .find_map(|selector| {
            let node = dom.query(None, selector).ok()??;
            dom.visible_text(node)
        })
        .unwrap_or_else(|| profile.fallback_title.to_string())
}

/// Strip Google's `entry.` prefix: `entry.1234` becomes `1234`.
pub fn strip_entry_prefix(key: &str) -> String {
    key.strip_prefix("entry.").unwrap_or(key).to_string()
}
