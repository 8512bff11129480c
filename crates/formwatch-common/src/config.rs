use crate::protocol::TriggerSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub ignore: IgnoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Case-insensitive regular expressions matched against page and action URLs.
    #[serde(default = "default_ignore_patterns")]
    pub patterns: Vec<String>,
    /// Appended to `patterns` so a config file can extend the defaults.
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            patterns: default_ignore_patterns(),
            extra_patterns: Vec::new(),
        }
    }
}

impl IgnoreConfig {
    pub fn all_patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns
            .iter()
            .chain(self.extra_patterns.iter())
            .map(|p| p.as_str())
    }
}

fn default_ignore_patterns() -> Vec<String> {
    [
        "login",
        "log-in",
        "signin",
        "sign-in",
        "password",
        "passwd",
        "auth",
        "bank",
        "credit",
        "payment",
        "checkout",
        "billing",
        "cvv",
        "ssn",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before attempt N+1, indexed from the first retry. The last entry
    /// repeats if `max_attempts` outruns the list.
    #[serde(default = "default_retry_delays_ms")]
    pub delays_ms: Vec<u64>,
    #[serde(default = "default_true")]
    pub salvage: bool,
    /// Per-trigger replacement for `delays_ms`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub delay_overrides: HashMap<TriggerSource, Vec<u64>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delays_ms: default_retry_delays_ms(),
            salvage: true,
            delay_overrides: HashMap::new(),
        }
    }
}

impl RetryConfig {
    pub fn delays_for(&self, trigger: TriggerSource) -> &[u64] {
        self.delay_overrides
            .get(&trigger)
            .map(|d| d.as_slice())
            .unwrap_or(&self.delays_ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delays_ms() -> Vec<u64> {
    vec![300, 600]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,
    /// Each click schedules one retry chain per entry.
    #[serde(default = "default_click_delays_ms")]
    pub click_delays_ms: Vec<u64>,
    #[serde(default = "default_press_delay_ms")]
    pub press_delay_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rescan_interval_ms: default_rescan_interval_ms(),
            click_delays_ms: default_click_delays_ms(),
            press_delay_ms: default_press_delay_ms(),
        }
    }
}

fn default_rescan_interval_ms() -> u64 {
    1500
}

fn default_click_delays_ms() -> Vec<u64> {
    vec![100, 600]
}

fn default_press_delay_ms() -> u64 {
    50
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cross_check_delay_ms")]
    pub cross_check_delay_ms: u64,
    /// Build `fetch-generic` submissions from form-shaped bodies sent to
    /// endpoints that match no provider.
    #[serde(default = "default_true")]
    pub capture_unclassified: bool,
    #[serde(default = "default_telemetry_fragments")]
    pub telemetry_fragments: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cross_check_delay_ms: default_cross_check_delay_ms(),
            capture_unclassified: true,
            telemetry_fragments: default_telemetry_fragments(),
        }
    }
}

fn default_cross_check_delay_ms() -> u64 {
    250
}

fn default_telemetry_fragments() -> Vec<String> {
    ["/collect", "/analytics", "/beacon", "/logging", "/track", "/telemetry", "/metrics"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Identical submissions (same source, action and fields) inside this
    /// window are sent once.
    #[serde(default = "default_duplicate_window_ms")]
    pub duplicate_window_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            duplicate_window_ms: default_duplicate_window_ms(),
        }
    }
}

fn default_duplicate_window_ms() -> u64 {
    1000
}
