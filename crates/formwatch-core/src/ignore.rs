use formwatch_common::config::IgnoreConfig;
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Vetoes capture on sensitive pages (login, payment, banking, ...).
///
/// Patterns are case-insensitive regular expressions; a plain word acts as a
/// substring test. A match against either the page URL or the action URL
/// vetoes the submission.
#[derive(Debug, Clone)]
pub struct IgnorePolicy {
    patterns: Vec<Regex>,
}

impl IgnorePolicy {
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Self {
        let patterns = patterns
            .into_iter()
            .filter_map(|p| match RegexBuilder::new(p).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Skipping invalid ignore pattern {:?}: {}", p, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn from_config(config: &IgnoreConfig) -> Self {
        Self::new(config.all_patterns())
    }

    pub fn should_ignore(&self, page_url: &str, action_url: &str) -> bool {
        self.matching_pattern(page_url, action_url).is_some()
    }

    /// The first pattern that vetoes this pair, for logging.
    pub fn matching_pattern(&self, page_url: &str, action_url: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|re| re.is_match(page_url) || re.is_match(action_url))
            .map(|re| re.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for IgnorePolicy {
    fn default() -> Self {
        Self::from_config(&IgnoreConfig::default())
    }
}
