use super::profile::{CANDIDATE_SELECTOR, ProviderProfile, scan_document, strip_entry_prefix};
use super::{ProviderExtractor, state};
use crate::dom::Dom;
use formwatch_common::{FieldMap, ProviderKind};

pub static PROFILE: ProviderProfile = ProviderProfile {
    kind: ProviderKind::GoogleForms,
    candidate_selector: CANDIDATE_SELECTOR,
    container_selector: "[role=listitem], .freebirdFormviewerComponentsQuestionBaseRoot, \
         [data-params], .Qr7Oae",
    heading_selector: "[role=heading], .freebirdFormviewerComponentsQuestionBaseTitle, .M7eMe",
    label_attributes: &["data-label", "data-initial-value"],
    id_attributes: &["data-item-id"],
    positional_word: "Question",
    skip_names: &[
        "fbzx",
        "pageHistory",
        "fvv",
        "partialResponse",
        "submissionTimestamp",
        "draftResponse",
    ],
    title_selectors: &[".freebirdFormviewerViewHeaderTitle", "[role=heading][aria-level=\"1\"]"],
    fallback_title: "Google Form",
    normalize_key: strip_entry_prefix,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleFormsExtractor;

impl ProviderExtractor for GoogleFormsExtractor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleForms
    }

    fn profile(&self) -> &'static ProviderProfile {
        &PROFILE
    }

    fn extract(&self, dom: &dyn Dom) -> FieldMap {
        let mut fields = scan_document(dom, &PROFILE);
        fields.merge_over(state::google_state(dom));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, NodeSpec};
    use formwatch_common::FieldValue;

    fn question(title: &str, input: NodeSpec) -> NodeSpec {
        NodeSpec::new("div").attr("role", "listitem").children([
            NodeSpec::new("div").attr("role", "heading").text(title),
            input,
        ])
    }

    #[test]
    fn scans_questions_and_skips_bookkeeping() {
        let mut dom = MemoryDom::new("https://docs.google.com/forms/d/e/x/viewform", "");
        dom.append(
            dom.root(),
            NodeSpec::new("form").children([
                question("Name *", NodeSpec::new("input").attr("type", "text").value("Ada")),
                question(
                    "Comments",
                    NodeSpec::new("textarea").attr("name", "entry.555").text("Hi"),
                ),
                NodeSpec::new("input").attr("type", "hidden").attr("name", "fbzx").value("-1"),
                NodeSpec::new("input").attr("name", "fvv").value("1"),
            ]),
        );

        let fields = GoogleFormsExtractor.extract(&dom);
        assert_eq!(fields.get("Name"), Some(&FieldValue::from("Ada")));
        assert_eq!(fields.get("555"), Some(&FieldValue::from("Hi")));
        assert!(!fields.contains_key("fvv"));
        assert_eq!(fields.len(), 2);
        assert_eq!(GoogleFormsExtractor.title(&dom), "Google Form");
    }

    #[test]
    fn aria_checkboxes_accumulate_under_question() {
        let mut dom = MemoryDom::new("https://docs.google.com/forms/d/e/x/viewform", "Survey");
        dom.append(
            dom.root(),
            NodeSpec::new("div").attr("role", "listitem").children([
                NodeSpec::new("div").attr("role", "heading").text("Interests"),
                NodeSpec::new("div")
                    .attr("role", "checkbox")
                    .attr("aria-checked", "true")
                    .attr("data-answer-value", "a"),
                NodeSpec::new("div")
                    .attr("role", "checkbox")
                    .attr("aria-checked", "false")
                    .attr("data-answer-value", "x"),
                NodeSpec::new("div")
                    .attr("role", "checkbox")
                    .attr("aria-checked", "true")
                    .attr("data-answer-value", "b"),
            ]),
        );
        let fields = GoogleFormsExtractor.extract(&dom);
        assert_eq!(fields.get("Interests"), Some(&FieldValue::from(vec!["a", "b"])));
    }

    #[test]
    fn unlabelled_input_gets_positional_key() {
        let mut dom = MemoryDom::new("https://docs.google.com/forms/d/e/x/viewform", "");
        dom.append(dom.root(), NodeSpec::new("input").value("one"));
        dom.append(dom.root(), NodeSpec::new("input").value("two"));
        let fields = GoogleFormsExtractor.extract(&dom);
        assert_eq!(fields.get("Question 1"), Some(&FieldValue::from("one")));
        assert_eq!(fields.get("Question 2"), Some(&FieldValue::from("two")));
    }

    #[test]
    fn repeated_extraction_is_stable() {
        let mut dom = MemoryDom::new("https://docs.google.com/forms/d/e/x/viewform", "");
        dom.append(
            dom.root(),
            NodeSpec::new("form").children([
                question("Email", NodeSpec::new("input").value("ada@example.com")),
                question("Email", NodeSpec::new("input").value("work@example.com")),
                NodeSpec::new("input").attr("type", "hidden").attr("name", "entry.9").value("x"),
            ]),
        );
        let first = GoogleFormsExtractor.extract(&dom);
        assert_eq!(GoogleFormsExtractor.extract(&dom), first);
        assert_eq!(first.get("Email"), Some(&FieldValue::from("ada@example.com")));
        assert_eq!(first.get("Email (2)"), Some(&FieldValue::from("work@example.com")));
    }
}
