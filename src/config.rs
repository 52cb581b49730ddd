//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$DBXTRACT_CONFIG` (environment variable)
//! 2. `~/.config/dbxtract/config.toml` (Linux/macOS)
//!    `%APPDATA%\dbxtract\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::export::extract::ExtractOptions;
use crate::export::naming::{NamingOptions, DEFAULT_FIELD_PREFIX_LEN};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    /// Defaults for the extraction flags.
    pub extract: ExtractConfig,
    pub naming: NamingConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Extraction defaults; command-line flags can only switch these on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub recover: bool,
    pub safe_mode: bool,
    pub keep_orphans: bool,
    pub ignore_zero_length: bool,
    pub set_timestamps: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Characters kept from each of sender, receiver and subject.
    pub field_prefix_len: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            recover: false,
            safe_mode: false,
            keep_orphans: false,
            ignore_zero_length: false,
            set_timestamps: true,
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            field_prefix_len: DEFAULT_FIELD_PREFIX_LEN,
        }
    }
}

impl Config {
    /// Extraction options as configured, before command-line overrides.
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            naming: NamingOptions {
                safe_mode: self.extract.safe_mode,
                field_prefix_len: self.naming.field_prefix_len.max(1),
            },
            keep_orphans: self.extract.keep_orphans,
            ignore_zero_length: self.extract.ignore_zero_length,
            set_timestamps: self.extract.set_timestamps,
            debug_dump: false,
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("DBXTRACT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("dbxtract").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dbxtract")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("dbxtract.log")
}
