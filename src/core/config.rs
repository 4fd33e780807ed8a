use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};
use tracing::debug;

use crate::core::Priority;
use crate::exchanger::ExchangerOptions;
use crate::merge::MergePolicy;
use crate::providers::{cae::CAE_BASE_URL, ecb::ECB_BASE_URL, rcb::RCB_BASE_URL};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceConfig {
    pub base_url: String,
    #[serde(default)]
    pub priority: Priority,
}

impl SourceConfig {
    fn new(base_url: &str, priority: Priority) -> Self {
        SourceConfig {
            base_url: base_url.to_string(),
            priority,
        }
    }
}

/// A missing entry disables that source.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub ecb: Option<SourceConfig>,
    pub rcb: Option<SourceConfig>,
    pub cae: Option<SourceConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            ecb: Some(SourceConfig::new(ECB_BASE_URL, 0)),
            rcb: Some(SourceConfig::new(RCB_BASE_URL, 1)),
            cae: Some(SourceConfig::new(CAE_BASE_URL, 2)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub retries: usize,
    pub retry_backoff_ms: u64,
    pub request_timeout_ms: u64,
    pub merge_strategy: MergePolicy,
    pub providers: ProvidersConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            retries: crate::DEFAULT_RETRIES,
            retry_backoff_ms: crate::DEFAULT_RETRY_BACKOFF.as_millis() as u64,
            request_timeout_ms: crate::DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            merge_strategy: MergePolicy::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "xfx", "xfx")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!(?config, "Successfully loaded config");
        Ok(config)
    }

    pub fn options(&self) -> ExchangerOptions {
        ExchangerOptions {
            retries: self.retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            strategy: self.merge_strategy.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
retries: 3
retry_backoff_ms: 250
request_timeout_ms: 2000
merge_strategy: priority
providers:
  ecb:
    base_url: "http://example.com/ecb"
    priority: 5
  cae:
    base_url: "http://example.com/cae"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(config.retries, 3);
        assert_eq!(config.merge_strategy, MergePolicy::Priority);
        assert_eq!(
            config.providers.ecb,
            Some(SourceConfig::new("http://example.com/ecb", 5))
        );
        assert!(config.providers.rcb.is_none());
        assert_eq!(config.providers.cae.unwrap().priority, 0);

        let options = AppConfig {
            retries: 3,
            retry_backoff_ms: 250,
            request_timeout_ms: 2000,
            ..AppConfig::default()
        }
        .options();
        assert_eq!(options.retries, 3);
        assert_eq!(options.retry_backoff, Duration::from_millis(250));
        assert_eq!(options.request_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_config_defaults() {
        let config: AppConfig = serde_yaml::from_str("merge_strategy: average").unwrap();
        assert_eq!(config.merge_strategy, MergePolicy::Average);
        assert_eq!(config.retries, 1);
        assert_eq!(config.retry_backoff_ms, 5000);
        assert_eq!(config.request_timeout_ms, 10000);
        assert_eq!(config.providers, ProvidersConfig::default());
        assert_eq!(config.providers.cae.unwrap().priority, 2);
    }

    #[test]
    fn test_config_rejects_unknown_strategy() {
        assert!(serde_yaml::from_str::<AppConfig>("merge_strategy: fastest").is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "retries: 0\nproviders:\n  rcb:\n    base_url: http://localhost:1\n").unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.retries, 0);
        assert!(config.providers.ecb.is_none());
        assert_eq!(config.providers.rcb.unwrap().base_url, "http://localhost:1");

        assert!(AppConfig::load_from_path("/nonexistent/xfx/config.yaml").is_err());
    }
}
