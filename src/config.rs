//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.apimerge.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::DEFAULT_CALLER_HEADER;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".apimerge.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Source fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Aggregation endpoint settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path of the JSON source store.
    #[serde(default = "default_store")]
    pub store: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
        }
    }
}

fn default_store() -> PathBuf {
    PathBuf::from("config.json")
}

/// Per-source fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout of each source request in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Header carrying the caller identity.
    #[serde(default = "default_caller_header")]
    pub caller_header: String,

    /// Maximum concurrent source requests. Unset means no limit.
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            caller_header: default_caller_header(),
            max_in_flight: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_timeout() -> u64 {
    5
}

fn default_caller_header() -> String {
    DEFAULT_CALLER_HEADER.to_string()
}

/// Aggregation endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given explicitly on the command line override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref store) = args.store {
            self.general.store = store.clone();
        }

        if let Some(timeout) = args.timeout {
            self.fetch.timeout_seconds = timeout;
        }

        if let crate::cli::Command::Serve { bind: Some(ref bind) } = args.command {
            self.server.bind = bind.clone();
        }
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.timeout_seconds == 0 {
            anyhow::bail!("fetch.timeout_seconds must be at least 1 second");
        }

        if self.fetch.max_in_flight == Some(0) {
            anyhow::bail!("fetch.max_in_flight must be at least 1");
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
