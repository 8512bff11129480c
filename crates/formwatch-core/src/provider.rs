use crate::dom::{Dom, PageLocation};
pub use formwatch_common::ProviderKind;

const GOOGLE_HOST: &str = "docs.google.com";
const MICROSOFT_HOSTS: [&str; 3] = [
    "forms.office.com",
    "forms.microsoft.com",
    "forms.cloud.microsoft",
];
const CLICKUP_HOST: &str = "forms.clickup.com";

/// A classification rule: the first rule whose predicate holds wins.
struct ProviderRule {
    kind: ProviderKind,
    applies: fn(&str, &str) -> bool,
}

const RULES: [ProviderRule; 3] = [
    ProviderRule {
        kind: ProviderKind::GoogleForms,
        applies: |host, path| host == GOOGLE_HOST && path.contains("/forms/"),
    },
    ProviderRule {
        kind: ProviderKind::MicrosoftForms,
        applies: |host, _| MICROSOFT_HOSTS.contains(&host),
    },
    ProviderRule {
        kind: ProviderKind::ClickupForms,
        applies: |host, _| host == CLICKUP_HOST,
    },
];

/// Decide which provider governs a page from its hostname and pathname.
pub fn classify(hostname: &str, pathname: &str) -> ProviderKind {
    let host = hostname.trim_end_matches('.').to_lowercase();
    RULES
        .iter()
        .find(|rule| (rule.applies)(&host, pathname))
        .map(|rule| rule.kind)
        .unwrap_or(ProviderKind::Native)
}

pub fn classify_location(location: &PageLocation) -> ProviderKind {
    classify(&location.hostname, &location.pathname)
}

/// Classify the document's current location. SPA navigation can change the
/// answer without a reload, so callers re-run this on every attempt.
pub fn classify_dom(dom: &dyn Dom) -> ProviderKind {
    dom.location()
        .map(|loc| classify_location(&loc))
        .unwrap_or(ProviderKind::Native)
}
