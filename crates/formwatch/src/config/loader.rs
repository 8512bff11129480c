use formwatch_common::CaptureConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming a config file. Takes precedence over the
/// search path; a missing file there is an error rather than a skip.
pub const CONFIG_ENV: &str = "FORMWATCH_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid YAML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{}: [{section}] {reason}", path.display())]
    Invalid {
        path: PathBuf,
        section: &'static str,
        reason: String,
    },
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Files tried when neither `--config` nor `FORMWATCH_CONFIG` is set, in
    /// order: `./formwatch.yaml`, `./formwatch.yml`, the platform config dir
    /// (`formwatch/config.yaml`), then `~/.formwatch/config.yaml`.
    pub fn search_path() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("formwatch.yaml"), PathBuf::from("formwatch.yml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("formwatch").join("config.yaml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".formwatch").join("config.yaml"));
        }
        paths
    }

    /// The first existing file in `paths`, or defaults when there is none.
    pub async fn load_first(paths: &[PathBuf]) -> Result<CaptureConfig, ConfigError> {
        for path in paths {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Self::load_from(path).await;
            }
            debug!("No config at {}", path.display());
        }
        Ok(CaptureConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<CaptureConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        validate(&config).map_err(|(section, reason)| ConfigError::Invalid {
            path: path.to_path_buf(),
            section,
            reason,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// An empty document is a valid "all defaults" config.
    pub fn parse(content: &str) -> Result<CaptureConfig, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(CaptureConfig::default());
        }
        serde_yaml::from_str(content)
    }

    /// `--config`, then `FORMWATCH_CONFIG`, then [`Self::search_path`].
    pub async fn resolve(path: Option<&Path>) -> Result<CaptureConfig, ConfigError> {
        if let Some(path) = path {
            return Self::load_from(path).await;
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Self::load_from(Path::new(&path)).await;
        }
        Self::load_first(&Self::search_path()).await
    }
}

/// Values that deserialize fine but leave the engine unable to work.
fn validate(config: &CaptureConfig) -> Result<(), (&'static str, String)> {
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        return Err(("retry", "max_attempts must be at least 1".to_string()));
    }
    if retry.max_attempts > 1 && retry.delays_ms.is_empty() {
        return Err((
            "retry",
            format!("delays_ms is empty but max_attempts is {}", retry.max_attempts),
        ));
    }
    let mut overrides: Vec<_> = retry.delay_overrides.iter().collect();
    overrides.sort_by_key(|(trigger, _)| trigger.as_str());
    if let Some((trigger, _)) = overrides.iter().find(|(_, delays)| delays.is_empty()) {
        return Err(("retry", format!("delay_overrides.{} is empty", trigger.as_str())));
    }

    let watcher = &config.watcher;
    if watcher.enabled {
        if watcher.rescan_interval_ms == 0 {
            return Err(("watcher", "rescan_interval_ms must be greater than 0".to_string()));
        }
        if watcher.click_delays_ms.is_empty() {
            return Err(("watcher", "click_delays_ms must list at least one delay".to_string()));
        }
    }
    Ok(())
}
