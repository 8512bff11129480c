//! Last-resort capture once every retry attempt came back empty.

use super::label::{LabelScope, clean_label, resolve_label};
use super::profile::ProviderProfile;
use crate::dom::{Dom, DomError, NodeId};
use formwatch_common::FieldMap;
use tracing::debug;

const SALVAGE_SELECTOR: &str = "input, select, textarea";

/// Collect every control that currently holds a value, under its best name.
///
/// Key order: `name`, `id`, `aria-label`, `placeholder`, the profile's label
/// chain, then `field_<n>`.
pub fn salvage(dom: &dyn Dom, profile: &ProviderProfile) -> FieldMap {
    let mut fields = FieldMap::new();
    let Ok(nodes) = dom.query_all(None, SALVAGE_SELECTOR) else {
        return fields;
    };
    for (index, node) in nodes.into_iter().enumerate() {
        if let Err(e) = salvage_node(dom, profile, node, index + 1, &mut fields) {
            debug!("Salvage skipping element {}: {}", node, e);
        }
    }
    fields
}

fn salvage_node(
    dom: &dyn Dom,
    profile: &ProviderProfile,
    node: NodeId,
    position: usize,
    fields: &mut FieldMap,
) -> Result<(), DomError> {
    let state = dom.control(node)?;
    if state.disabled
        || matches!(
            state.input_type.as_str(),
            "password" | "hidden" | "submit" | "button" | "reset" | "image" | "file"
        )
    {
        return Ok(());
    }
    if matches!(state.input_type.as_str(), "checkbox" | "radio") && !state.checked {
        return Ok(());
    }

    let values: Vec<String> = if state.multiple {
        state.selected
    } else {
        vec![state.value]
    };
    let values: Vec<String> = values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Ok(());
    }

    let key = ["name", "id", "aria-label", "placeholder"]
        .iter()
        .find_map(|attr| dom.attr_text(node, attr))
        .map(clean_label)
        .filter(|k| !k.is_empty())
        .or_else(|| resolve_label(&LabelScope { dom, node, profile }))
        .unwrap_or_else(|| format!("field_{}", position));
    if key.to_lowercase().contains("password") {
        return Ok(());
    }

    for value in values {
        fields.push_value(key.as_str(), value);
    }
    Ok(())
}
