//! Configuration management for Fanout

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

pub const DEFAULT_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Delivery targets keyed by platform identifier
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

/// Settings for one delivery target; `kind` picks the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlatformConfig {
    /// Write each post as a JSON document into an outbox directory
    File {
        #[serde(default)]
        directory: String,
        #[serde(default)]
        options: Map<String, Value>,
    },
    /// Print each post as a JSON line on stdout
    Console {
        #[serde(default)]
        options: Map<String, Value>,
    },
}

impl PlatformConfig {
    /// Options merged into every payload sent to this platform
    pub fn options(&self) -> &Map<String, Value> {
        match self {
            PlatformConfig::File { options, .. } | PlatformConfig::Console { options } => options,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PlatformConfig::File { .. } => "file",
            PlatformConfig::Console { .. } => "console",
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = Self::load_from_path(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration, falling back to defaults when no file exists
    pub fn load_or_default() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(
                "No config at {}, using defaults",
                config_path.display()
            );
            Self::default_config()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: resolve_data_path()
                    .map(|dir| dir.join("posts.db").to_string_lossy().to_string())
                    .unwrap_or_else(|_| "~/.local/share/fanout/posts.db".to_string()),
            },
            scheduler: SchedulerConfig::default(),
            platforms: BTreeMap::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.interval_secs must be greater than zero".to_string(),
            )
            .into());
        }
        let mut seen = std::collections::HashSet::new();
        for name in self.platforms.keys() {
            let key = name.trim().to_lowercase();
            if key.is_empty() {
                return Err(
                    ConfigError::Invalid("platform names cannot be empty".to_string()).into(),
                );
            }
            // Platform lookups ignore case, so these would shadow each other
            if !seen.insert(key) {
                return Err(ConfigError::Invalid(format!(
                    "platform '{}' is configured more than once (names are case-insensitive)",
                    name.trim()
                ))
                .into());
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FANOUT_DB_PATH") {
            if !path.trim().is_empty() {
                self.database.path = path;
            }
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory conventions
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("FANOUT_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("fanout").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory conventions
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("fanout"))
}
