use super::profile::{CANDIDATE_SELECTOR, ProviderProfile, scan_document};
use super::{ProviderExtractor, state};
use crate::dom::Dom;
use formwatch_common::{FieldMap, ProviderKind};

const STATE_GLOBALS: [&str; 3] = ["__INITIAL_STATE__", "formState", "__FORM_STATE__"];

pub static PROFILE: ProviderProfile = ProviderProfile {
    kind: ProviderKind::MicrosoftForms,
    candidate_selector: CANDIDATE_SELECTOR,
    container_selector: "[data-automation-id=questionItem], .office-form-question, [role=group]",
    heading_selector: "[data-automation-id=questionTitle], .office-form-question-title, \
         [role=heading]",
    label_attributes: &["data-automation-value", "title"],
    id_attributes: &["data-automation-id-question", "data-question-id"],
    positional_word: "Question",
    skip_names: &[],
    title_selectors: &["[data-automation-id=formTitle]", ".office-form-title", "h1"],
    fallback_title: "Microsoft Form",
    normalize_key: |k| k.to_string(),
};

#[derive(Debug, Clone, Copy, Default)]
pub struct MicrosoftFormsExtractor;

impl ProviderExtractor for MicrosoftFormsExtractor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::MicrosoftForms
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
    use serde_json::json;

    #[test]
    fn question_titles_and_state_overlay() {
        let mut dom = MemoryDom::new("https://forms.office.com/Pages/ResponsePage.aspx", "");
        dom.append(
            dom.root(),
            NodeSpec::new("div")
                .attr("data-automation-id", "questionItem")
                .children([
                    NodeSpec::new("span")
                        .attr("data-automation-id", "questionTitle")
                        .text("2. Department"),
                    NodeSpec::new("input").value("Sales"),
                    NodeSpec::new("input").attr("type", "hidden").value("token"),
                ]),
        );
        dom.append(
            dom.root(),
            NodeSpec::new("div").attr("data-automation-id", "formTitle").text("Onboarding"),
        );
        dom.set_global(
            "__INITIAL_STATE__",
            json!({"answers": [{"questionText": "Department", "answer": "Sales EMEA"}]}),
        );

        let fields = MicrosoftFormsExtractor.extract(&dom);
        assert_eq!(fields.get("Department"), Some(&FieldValue::from("Sales EMEA")));
        assert_eq!(fields.len(), 1);
        assert_eq!(MicrosoftFormsExtractor.title(&dom), "Onboarding");
    }

    #[test]
    fn identifier_outranks_positional_label() {
        let mut dom = MemoryDom::new("https://forms.office.com/r/abc", "");
        dom.append(
            dom.root(),
            NodeSpec::new("input").attr("data-question-id", "r1a2b3").value("42"),
        );
        let fields = MicrosoftFormsExtractor.extract(&dom);
        assert_eq!(fields.get("r1a2b3"), Some(&FieldValue::from("42")));
    }

    #[test]
    fn repeated_extraction_is_stable() {
        let mut dom = MemoryDom::new("https://forms.office.com/r/abc", "");
        dom.append(
            dom.root(),
            NodeSpec::new("div")
                .attr("data-automation-id", "questionItem")
                .children([
                    NodeSpec::new("span")
                        .attr("data-automation-id", "questionTitle")
                        .text("1. Team"),
                    NodeSpec::new("input").value("Ops"),
                ]),
        );
        dom.set_global("__INITIAL_STATE__", json!({"answers": [{"questionText": "Team", "answer": "Ops"}]}));
        let first = MicrosoftFormsExtractor.extract(&dom);
        assert_eq!(MicrosoftFormsExtractor.extract(&dom), first);
        assert_eq!(first.len(), 1);
    }
}
