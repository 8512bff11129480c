//! Network-layer capture: request classification, body parsing and the
//! fetch/XHR decorators.

pub mod body;
pub mod interceptor;

pub use body::{BodyParseError, ParsedBody, parse_body};
pub use interceptor::{
    FetchInit, FetchPrimitive, InterceptedFetch, InterceptedXhr, RequestObserver, XhrPrimitive,
    XhrTable,
};

use formwatch_common::ProviderKind;

/// Lowercased URL fragments identifying each provider's submission endpoint.
const ENDPOINTS: [(ProviderKind, &str); 6] = [
    (ProviderKind::GoogleForms, "/formresponse"),
    (ProviderKind::MicrosoftForms, "/formapi/"),
    (ProviderKind::MicrosoftForms, "forms.office.com/handlers/"),
    (ProviderKind::MicrosoftForms, "forms.cloud.microsoft/handlers/"),
    (ProviderKind::ClickupForms, "forms.clickup.com/"),
    (ProviderKind::ClickupForms, "api.clickup.com/forms"),
];

/// One value inside a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormDataValue {
    Text(String),
    File { name: String },
}

/// A request body as the host hands it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// A `FormData` object, already split into entries.
    FormData(Vec<(String, FormDataValue)>),
    /// A string body: JSON or URL-encoded.
    Text(String),
    /// Blob, stream or buffer; never inspected.
    Opaque,
}

/// An outgoing call seen by an interceptor, before it is delegated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedRequest {
    pub method: String,
    pub url: String,
    pub body: Option<RequestBody>,
}

impl ObservedRequest {
    pub fn new(method: &str, url: &str, body: Option<RequestBody>) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            body,
        }
    }

    /// POST or PUT carrying a body.
    pub fn is_candidate(&self) -> bool {
        let method = self.method.to_ascii_uppercase();
        (method == "POST" || method == "PUT") && self.body.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequestClassification {
    pub method: String,
    pub url: String,
    /// `None` when no provider endpoint matched.
    pub provider: Option<ProviderKind>,
}

pub fn classify_url(url: &str) -> Option<ProviderKind> {
    let lower = url.to_lowercase();
    ENDPOINTS
        .iter()
        .find(|(_, fragment)| lower.contains(fragment))
        .map(|(kind, _)| *kind)
}

pub fn classify_request(request: &ObservedRequest) -> NetworkRequestClassification {
    NetworkRequestClassification {
        method: request.method.to_ascii_uppercase(),
        url: request.url.clone(),
        provider: classify_url(&request.url),
    }
}

/// Analytics and logging beacons are never treated as form submissions.
pub fn is_telemetry(url: &str, fragments: &[String]) -> bool {
    let lower = url.to_lowercase();
    fragments.iter().any(|f| lower.contains(&f.to_lowercase()))
}
