//! Field extraction.
//!
//! [`generic`] reads one native `<form>`. The provider modules scan the whole
//! document with a shared algorithm ([`profile::scan_document`]) driven by a
//! per-provider [`profile::ProviderProfile`], then overlay whatever their
//! in-page state reader recovers. [`salvage`] is the last-resort pass the retry
//! scheduler runs once every attempt came back empty.

pub mod clickup;
pub mod generic;
pub mod google;
pub mod label;
pub mod microsoft;
pub mod profile;
pub mod salvage;
pub mod state;

use crate::dom::{Dom, DomError, NodeId};
use formwatch_common::{FieldMap, ProviderKind};

pub use generic::GenericExtractor;
pub use profile::ProviderProfile;

/// A document-wide extractor for one form provider.
pub trait ProviderExtractor {
    fn kind(&self) -> ProviderKind;

    fn profile(&self) -> &'static ProviderProfile;

    /// Scan the document. Never fails; elements that cannot be read are skipped.
    fn extract(&self, dom: &dyn Dom) -> FieldMap;

    fn title(&self, dom: &dyn Dom) -> String {
        profile::page_title(dom, self.profile())
    }
}

static GOOGLE: google::GoogleFormsExtractor = google::GoogleFormsExtractor;
static MICROSOFT: microsoft::MicrosoftFormsExtractor = microsoft::MicrosoftFormsExtractor;
static CLICKUP: clickup::ClickupFormsExtractor = clickup::ClickupFormsExtractor;

/// The extractor for a SaaS provider; `None` for native pages.
pub fn extractor_for(kind: ProviderKind) -> Option<&'static dyn ProviderExtractor> {
    match kind {
        ProviderKind::Native => None,
        ProviderKind::GoogleForms => Some(&GOOGLE),
        ProviderKind::MicrosoftForms => Some(&MICROSOFT),
        ProviderKind::ClickupForms => Some(&CLICKUP),
    }
}

/// What a single element contributes to a field mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ControlValue {
    /// Free-form value. Same-named controls accumulate into a sequence.
    Text(String),
    /// A checked checkbox/radio.
    Checked(String),
    /// Multi-select: every selected option, in order.
    Many(Vec<String>),
    Skip,
}

impl ControlValue {
    pub(crate) fn store(self, fields: &mut FieldMap, key: &str) {
        match self {
            ControlValue::Text(value) | ControlValue::Checked(value) => {
                fields.push_value(key, value)
            }
            ControlValue::Many(values) => {
                for value in values {
                    fields.push_value(key, value);
                }
            }
            ControlValue::Skip => {}
        }
    }
}

pub(crate) fn file_summary(count: usize) -> String {
    if count == 1 {
        "1 file".to_string()
    } else {
        format!("{} files", count)
    }
}

/// Value of a native form control (`input`, `select`, `textarea`).
///
/// Password, disabled and button-like controls are skipped. File inputs
/// report a count, never content.
pub(crate) fn control_value(dom: &dyn Dom, node: NodeId) -> Result<ControlValue, DomError> {
    let tag = dom.tag_name(node)?;
    let state = dom.control(node)?;
    if state.disabled {
        return Ok(ControlValue::Skip);
    }

    let value = match tag.as_str() {
        "input" => match state.input_type.as_str() {
            "password" | "submit" | "button" | "reset" | "image" => ControlValue::Skip,
            "checkbox" | "radio" if !state.checked => ControlValue::Skip,
            "checkbox" | "radio" if state.value.is_empty() => {
                ControlValue::Checked("checked".to_string())
            }
            "checkbox" | "radio" => ControlValue::Checked(state.value),
            "file" if state.file_count == 0 => ControlValue::Skip,
            "file" => ControlValue::Text(file_summary(state.file_count)),
            _ => ControlValue::Text(state.value),
        },
        "select" if state.multiple => ControlValue::Many(state.selected),
        "select" | "textarea" => ControlValue::Text(state.value),
        _ => ControlValue::Skip,
    };

    Ok(match value {
        ControlValue::Text(v) if v.trim().is_empty() => ControlValue::Skip,
        ControlValue::Many(v) if v.iter().all(|s| s.is_empty()) => ControlValue::Skip,
        other => other,
    })
}

/// Value of any element a provider scan enumerates: native controls plus the
/// ARIA widgets SaaS form builders render instead of them.
pub(crate) fn element_value(dom: &dyn Dom, node: NodeId) -> Result<ControlValue, DomError> {
    let tag = dom.tag_name(node)?;
    if matches!(tag.as_str(), "input" | "select" | "textarea") {
        if tag == "input" && dom.control(node)?.input_type == "hidden" {
            return Ok(ControlValue::Skip);
        }
        return control_value(dom, node);
    }

    if dom.attribute(node, "aria-disabled")?.as_deref() == Some("true") {
        return Ok(ControlValue::Skip);
    }

    let role = dom.attribute(node, "role")?.unwrap_or_default().to_lowercase();
    let value = match role.as_str() {
        "radio" | "checkbox" => {
            if dom.attribute(node, "aria-checked")?.as_deref() != Some("true") {
                return Ok(ControlValue::Skip);
            }
            let label = ["data-value", "data-answer-value", "aria-label"]
                .iter()
                .find_map(|attr| dom.attr_text(node, attr))
                .or_else(|| dom.visible_text(node))
                .unwrap_or_else(|| "checked".to_string());
            ControlValue::Checked(label)
        }
        "listbox" | "combobox" => {
            let selected = dom.query(Some(node), "[aria-selected=true]")?;
            let value = dom
                .attr_text(node, "data-value")
                .or_else(|| dom.attr_text(node, "aria-valuetext"))
                .or_else(|| {
                    selected.and_then(|opt| {
                        dom.attr_text(opt, "data-value")
                            .or_else(|| dom.visible_text(opt))
                    })
                });
            match value {
                Some(v) => ControlValue::Text(v),
                None if role == "combobox" => {
                    ControlValue::Text(dom.visible_text(node).unwrap_or_default())
                }
                None => ControlValue::Skip,
            }
        }
        _ => ControlValue::Text(dom.visible_text(node).unwrap_or_default()),
    };

    Ok(match value {
        ControlValue::Text(v) if v.is_empty() => ControlValue::Skip,
        other => other,
    })
}
