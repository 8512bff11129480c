use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single captured value: plain text, or an ordered list for multi-valued
/// controls (checkbox groups, multi-selects, repeated form-data keys).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multi(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Single(s) => s.is_empty(),
            FieldValue::Multi(values) => values.iter().all(|v| v.is_empty()),
        }
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            FieldValue::Single(s) => Some(s),
            FieldValue::Multi(_) => None,
        }
    }

    /// All values in order, regardless of arity.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::Single(s) => vec![s.as_str()],
            FieldValue::Multi(values) => values.iter().map(|v| v.as_str()).collect(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Single(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Single(s)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(values: Vec<&str>) -> Self {
        FieldValue::Multi(values.into_iter().map(|v| v.to_string()).collect())
    }
}

/// Insertion-ordered field mapping with unique keys.
///
/// Empty values are never stored. Equality compares key/value pairs and
/// ignores key order; the order inside a `Multi` value is significant.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set `key` to `value`, replacing any previous value in place.
    /// Empty keys and empty values are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        if key.is_empty() || value.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Append `value` under `key`, promoting a single value to a sequence.
    pub fn push_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if key.is_empty() || value.is_empty() {
            return;
        }
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, FieldValue::Multi(values))) => values.push(value),
            Some((_, existing)) => {
                let FieldValue::Single(first) = existing.clone() else {
                    return;
                };
                *existing = FieldValue::Multi(vec![first, value]);
            }
            None => self.entries.push((key, FieldValue::Single(value))),
        }
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge_over(&mut self, other: FieldMap) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &FieldValue) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }
}

impl PartialEq for FieldMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| o == v))
    }
}

impl Eq for FieldMap {}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field names to strings or string lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut map = FieldMap::new();
                while let Some((k, v)) = access.next_entry::<String, FieldValue>()? {
                    map.insert(k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// The product governing a page's submission shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Native,
    GoogleForms,
    MicrosoftForms,
    ClickupForms,
}

impl ProviderKind {
    pub fn source(self) -> SubmissionSource {
        match self {
            ProviderKind::Native => SubmissionSource::Native,
            ProviderKind::GoogleForms => SubmissionSource::GoogleForms,
            ProviderKind::MicrosoftForms => SubmissionSource::MicrosoftForms,
            ProviderKind::ClickupForms => SubmissionSource::ClickupForms,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.source().as_str()
    }
}

/// Where a submission's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionSource {
    Native,
    GoogleForms,
    MicrosoftForms,
    ClickupForms,
    FetchGeneric,
}

impl SubmissionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionSource::Native => "native",
            SubmissionSource::GoogleForms => "google-forms",
            SubmissionSource::MicrosoftForms => "microsoft-forms",
            SubmissionSource::ClickupForms => "clickup-forms",
            SubmissionSource::FetchGeneric => "fetch-generic",
        }
    }
}

impl fmt::Display for SubmissionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical record of one captured form event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub url: String,
    pub action: String,
    pub timestamp: String,
    pub title: String,
    pub fields: FieldMap,
    pub source: SubmissionSource,
}

/// Messages sent over the one-way delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeliveryMessage {
    #[serde(rename = "FORM_SUBMISSION")]
    FormSubmission { data: Submission },
}

impl DeliveryMessage {
    pub fn submission(&self) -> &Submission {
        match self {
            DeliveryMessage::FormSubmission { data } => data,
        }
    }
}

/// What caused an extraction to run. Used for logging and delay selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    NativeSubmit,
    WatchedClick,
    WatchedPress,
    Network,
    CrossCheck,
}

impl TriggerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::NativeSubmit => "native_submit",
            TriggerSource::WatchedClick => "watched_click",
            TriggerSource::WatchedPress => "watched_press",
            TriggerSource::Network => "network",
            TriggerSource::CrossCheck => "cross_check",
        }
    }
}
