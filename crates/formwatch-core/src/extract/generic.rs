//! Native `<form>` extraction.

use super::control_value;
use crate::dom::{Dom, DomError, NodeId};
use formwatch_common::FieldMap;
use tracing::debug;

const CONTROL_SELECTOR: &str = "input, select, textarea, button";

#[derive(Debug, Clone, Copy, Default)]
pub struct GenericExtractor;

impl GenericExtractor {
    /// Read every named control owned by `form`, in document order.
    ///
    /// Controls outside the form that point at it with `form="<id>"` are
    /// included after its descendants.
    pub fn extract_form(&self, dom: &dyn Dom, form: NodeId) -> FieldMap {
        let mut fields = FieldMap::new();
        let controls = match owned_controls(dom, form) {
            Ok(controls) => controls,
            Err(e) => {
                debug!("Form {} unreadable: {}", form, e);
                return fields;
            }
        };

        for control in controls {
            if let Err(e) = read_control(dom, control, &mut fields) {
                debug!("Skipping control {}: {}", control, e);
            }
        }
        fields
    }
}

fn owned_controls(dom: &dyn Dom, form: NodeId) -> Result<Vec<NodeId>, DomError> {
    let mut controls = dom.query_all(Some(form), CONTROL_SELECTOR)?;
    if let Some(id) = dom.attr_text(form, "id") {
        let selector = format!("[form=\"{}\"]", id.replace('"', ""));
        for node in dom.query_all(None, &selector)? {
            if !controls.contains(&node) && dom.matches(node, CONTROL_SELECTOR)? {
                controls.push(node);
            }
        }
    }
    Ok(controls)
}

fn read_control(dom: &dyn Dom, control: NodeId, fields: &mut FieldMap) -> Result<(), DomError> {
    let Some(name) = dom.attr_text(control, "name") else {
        return Ok(());
    };
    control_value(dom, control)?.store(fields, &name);
    Ok(())
}

/// The form's submission target, resolved against the page URL. Missing or
/// unparseable `action` attributes fall back to the page URL.
pub fn form_action(dom: &dyn Dom, form: NodeId, page_href: &str) -> String {
    let Some(action) = dom.attr_text(form, "action") else {
        return page_href.to_string();
    };
    resolve_against(page_href, &action)
}

/// Resolve a possibly-relative `target` against `base`.
pub fn resolve_against(base: &str, target: &str) -> String {
    url::Url::parse(base)
        .and_then(|base| base.join(target))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| {
            if target.is_empty() {
                base.to_string()
            } else {
                target.to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, NodeSpec};
    use formwatch_common::FieldValue;

    fn signup() -> (MemoryDom, NodeId) {
        let mut dom = MemoryDom::new("https://example.com/signup", "Signup");
        let form = dom.append(
            dom.root(),
            NodeSpec::new("form")
                .attr("id", "f")
                .attr("action", "/subscribe")
                .children([
                    NodeSpec::new("input").attr("name", "email").value("a@b.com"),
                    NodeSpec::new("input")
                        .attr("name", "password")
                        .attr("type", "password")
                        .value("x"),
                    NodeSpec::new("input")
                        .attr("type", "checkbox")
                        .attr("name", "interests")
                        .attr("value", "a")
                        .checked(true),
                    NodeSpec::new("input")
                        .attr("type", "checkbox")
                        .attr("name", "interests")
                        .attr("value", "b")
                        .checked(true),
                    NodeSpec::new("input")
                        .attr("type", "checkbox")
                        .attr("name", "interests")
                        .attr("value", "c"),
                    NodeSpec::new("input").attr("value", "no name"),
                    NodeSpec::new("input").attr("name", "blank").value("   "),
                    NodeSpec::new("button").attr("name", "go").attr("value", "1"),
                ]),
        );
        (dom, form)
    }

    #[test]
    fn native_form_without_password() {
        let (dom, form) = signup();
        let fields = GenericExtractor.extract_form(&dom, form);
        assert_eq!(fields.get("email"), Some(&FieldValue::from("a@b.com")));
        assert!(!fields.contains_key("password"));
        assert!(!fields.contains_key("blank"));
        assert!(!fields.contains_key("go"));
    }

    #[test]
    fn checked_boxes_accumulate() {
        let (dom, form) = signup();
        let fields = GenericExtractor.extract_form(&dom, form);
        assert_eq!(fields.get("interests"), Some(&FieldValue::from(vec!["a", "b"])));
    }

    #[test]
    fn same_named_text_controls_accumulate() {
        let mut dom = MemoryDom::new("https://example.com/order", "");
        let form = dom.append(
            dom.root(),
            NodeSpec::new("form").children([
                NodeSpec::new("input").attr("name", "items[]").attr("value", "apple"),
                NodeSpec::new("input").attr("name", "items[]").attr("value", "pear"),
                NodeSpec::new("textarea").attr("name", "note").text("ring twice"),
                NodeSpec::new("textarea").attr("name", "note").text("leave at door"),
            ]),
        );
        let fields = GenericExtractor.extract_form(&dom, form);
        assert_eq!(fields.get("items[]"), Some(&FieldValue::from(vec!["apple", "pear"])));
        assert_eq!(
            fields.get("note"),
            Some(&FieldValue::from(vec!["ring twice", "leave at door"]))
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        let (dom, form) = signup();
        let first = GenericExtractor.extract_form(&dom, form);
        let second = GenericExtractor.extract_form(&dom, form);
        assert_eq!(first, second);
    }

    #[test]
    fn select_multiple_and_files() {
        let mut dom = MemoryDom::new("https://example.com/", "");
        let form = dom.append(
            dom.root(),
            NodeSpec::new("form").children([
                NodeSpec::new("select")
                    .attr("name", "tags")
                    .attr("multiple", "")
                    .children([
                        NodeSpec::new("option").attr("value", "x").attr("selected", ""),
                        NodeSpec::new("option").attr("value", "y"),
                        NodeSpec::new("option").attr("value", "z").attr("selected", ""),
                    ]),
                NodeSpec::new("input").attr("type", "file").attr("name", "cv").files(1),
            ]),
        );
        let fields = GenericExtractor.extract_form(&dom, form);
        assert_eq!(fields.get("tags"), Some(&FieldValue::from(vec!["x", "z"])));
        assert_eq!(fields.get("cv"), Some(&FieldValue::from("1 file")));
    }

    #[test]
    fn form_attribute_controls_are_owned() {
        let (mut dom, form) = signup();
        dom.append(
            dom.root(),
            NodeSpec::new("input").attr("form", "f").attr("name", "outside").value("yes"),
        );
        let fields = GenericExtractor.extract_form(&dom, form);
        assert_eq!(fields.get("outside"), Some(&FieldValue::from("yes")));
    }

    #[test]
    fn detached_form_yields_nothing() {
        let (mut dom, form) = signup();
        dom.remove(form);
        assert!(GenericExtractor.extract_form(&dom, form).is_empty());
    }

    #[test]
    fn action_resolution() {
        let (dom, form) = signup();
        assert_eq!(
            form_action(&dom, form, "https://example.com/signup"),
            "https://example.com/subscribe"
        );
        let bare = MemoryDom::new("https://example.com/", "");
        assert_eq!(form_action(&bare, bare.root(), "https://example.com/x"), "https://example.com/x");
    }
}
