use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Where the control service lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the control board's web server
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout; no timeout when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: None,
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

fn default_base_url() -> String {
    "http://zuluide.local".to_string()
}

/// Delays and periods used by the console state machines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay before re-reading status after start-up or an action
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Auto-refresh period
    #[serde(default = "default_auto_refresh_secs")]
    pub auto_refresh_secs: u64,
    /// Delay before the start-up version check
    #[serde(default = "default_version_delay_ms")]
    pub version_delay_ms: u64,
    /// Backoff after the service answers `wait` during enumeration
    #[serde(default = "default_enumeration_backoff_ms")]
    pub enumeration_backoff_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            auto_refresh_secs: default_auto_refresh_secs(),
            version_delay_ms: default_version_delay_ms(),
            enumeration_backoff_ms: default_enumeration_backoff_ms(),
        }
    }
}

impl TimingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn auto_refresh_period(&self) -> Duration {
        // interval() panics on a zero period
        Duration::from_secs(self.auto_refresh_secs.max(1))
    }

    pub fn version_delay(&self) -> Duration {
        Duration::from_millis(self.version_delay_ms)
    }

    pub fn enumeration_backoff(&self) -> Duration {
        Duration::from_millis(self.enumeration_backoff_ms)
    }
}

fn default_settle_delay_ms() -> u64 {
    1500
}

fn default_auto_refresh_secs() -> u64 {
    45
}

fn default_version_delay_ms() -> u64 {
    500
}

fn default_enumeration_backoff_ms() -> u64 {
    50
}

/// How the image catalog is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogStrategy {
    /// One image per `nextImage` request
    #[default]
    Iterate,
    /// The whole listing from `images` once the board has gathered it
    Bulk,
}

impl std::str::FromStr for CatalogStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "iterate" => Ok(Self::Iterate),
            "bulk" => Ok(Self::Bulk),
            _ => anyhow::bail!("Unknown catalog strategy: {} (expected iterate or bulk)", s),
        }
    }
}

impl std::fmt::Display for CatalogStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Iterate => "iterate",
            Self::Bulk => "bulk",
        })
    }
}

/// Image catalog settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub strategy: CatalogStrategy,
    /// Consecutive `wait` answers tolerated before a listing is abandoned
    #[serde(default = "default_max_consecutive_waits")]
    pub max_consecutive_waits: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            strategy: CatalogStrategy::default(),
            max_consecutive_waits: default_max_consecutive_waits(),
        }
    }
}

fn default_max_consecutive_waits() -> u32 {
    1200
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "zuluide", "ZuluControl")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    /// Directory for shell history and other runtime data
    pub fn data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "zuluide", "ZuluControl")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            tracing::info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.service.base_url, "http://zuluide.local");
        assert_eq!(config.service.request_timeout(), None);
        assert_eq!(config.timing.settle_delay(), Duration::from_millis(1500));
        assert_eq!(config.timing.auto_refresh_period(), Duration::from_secs(45));
        assert_eq!(config.timing.version_delay(), Duration::from_millis(500));
        assert_eq!(config.timing.enumeration_backoff(), Duration::from_millis(50));
        assert_eq!(config.catalog.strategy, CatalogStrategy::Iterate);
        assert_eq!(config.catalog.max_consecutive_waits, 1200);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [service]
            base_url = "http://192.168.1.40"

            [catalog]
            strategy = "bulk"
            "#,
        )
        .unwrap();

        assert_eq!(config.service.base_url, "http://192.168.1.40");
        assert_eq!(config.catalog.strategy, CatalogStrategy::Bulk);
        assert_eq!(config.catalog.max_consecutive_waits, 1200);
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.service.request_timeout_secs = Some(10);
        config.timing.auto_refresh_secs = 30;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.service.request_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_zero_auto_refresh_period_is_clamped() {
        let timing = TimingConfig {
            auto_refresh_secs: 0,
            ..Default::default()
        };
        assert_eq!(timing.auto_refresh_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_catalog_strategy_from_str() {
        assert_eq!("iterate".parse::<CatalogStrategy>().unwrap(), CatalogStrategy::Iterate);
        assert_eq!("bulk".parse::<CatalogStrategy>().unwrap(), CatalogStrategy::Bulk);
        assert!("stream".parse::<CatalogStrategy>().is_err());
    }
}
