use super::profile::{CANDIDATE_SELECTOR, ProviderProfile, scan_document};
use super::{ProviderExtractor, state};
use crate::dom::Dom;
use formwatch_common::{FieldMap, ProviderKind};

const STATE_GLOBALS: [&str; 2] = ["__NEXT_DATA__", "__INITIAL_STATE__"];

pub static PROFILE: ProviderProfile = ProviderProfile {
    kind: ProviderKind::ClickupForms,
    candidate_selector: CANDIDATE_SELECTOR,
    container_selector: ".cu-form__field, [data-test=form__field], .form-field, [role=group]",
    heading_selector: ".cu-form__field-label, [data-test=form__field-label], label",
    label_attributes: &["data-label", "data-placeholder"],
    id_attributes: &["data-field-id", "data-test-field-id"],
    positional_word: "Field",
    skip_names: &[],
    title_selectors: &[".cu-form__title", "[data-test=form__title]", "h1"],
    fallback_title: "ClickUp Form",
    normalize_key: |k| k.to_string(),
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ClickupFormsExtractor;

impl ProviderExtractor for ClickupFormsExtractor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ClickupForms
    }

    fn profile(&self) -> &'static ProviderProfile {
        &PROFILE
    }

    fn extract(&self, dom: &dyn Dom) -> FieldMap {
        let mut fields = scan_document(dom, &PROFILE);
        fields.merge_over(state::read_state_globals(dom, &STATE_GLOBALS));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, NodeSpec};
    use formwatch_common::FieldValue;

    #[test]
    fn field_labels_and_contenteditable() {
        let mut dom = MemoryDom::new("https://forms.clickup.com/123/f/abc/XYZ", "Bug report");
        dom.append(
            dom.root(),
            NodeSpec::new("div").attr("class", "cu-form__field").children([
                NodeSpec::new("div").attr("class", "cu-form__field-label").text("Summary:"),
                NodeSpec::new("input").value("Crash on save"),
            ]),
        );
        dom.append(
            dom.root(),
            NodeSpec::new("div")
                .attr("contenteditable", "true")
                .text("Steps to reproduce..."),
        );
        let fields = ClickupFormsExtractor.extract(&dom);
        assert_eq!(fields.get("Summary"), Some(&FieldValue::from("Crash on save")));
        assert_eq!(fields.get("Field 2"), Some(&FieldValue::from("Steps to reproduce...")));
        assert_eq!(ClickupFormsExtractor.title(&dom), "Bug report");
    }

    #[test]
    fn repeated_extraction_is_stable() {
        let mut dom = MemoryDom::new("https://forms.clickup.com/123/f/abc/XYZ", "");
        for value in ["Crash", "Freeze"] {
            dom.append(
                dom.root(),
                NodeSpec::new("div").attr("class", "cu-form__field").children([
                    NodeSpec::new("div").attr("class", "cu-form__field-label").text("Summary"),
                    NodeSpec::new("input").value(value),
                ]),
            );
        }
        let first = ClickupFormsExtractor.extract(&dom);
        assert_eq!(ClickupFormsExtractor.extract(&dom), first);
        assert_eq!(first.len(), 2);
    }
}
