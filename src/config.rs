//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXEXTRACT_CONFIG` (environment variable)
//! 2. `~/.config/mboxextract/config.toml` (Linux),
//!    `~/Library/Application Support/mboxextract/config.toml` (macOS),
//!    `%APPDATA%\mboxextract\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override file values; the result is a
//! [`ProcessorConfig`] which is validated before any processing starts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MboxError, Result};
use crate::parser::mbox::DEFAULT_MAX_MESSAGE_SIZE;
use crate::store::writer::STAGING_DIR_NAME;

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "attachments";

/// Default path of the (reserved) output mailbox.
pub const DEFAULT_OUTPUT_MBOX: &str = "output.mbox";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub general: GeneralConfig,
    /// Extraction defaults.
    pub extract: ExtractConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Directory for the log file (default: the cache directory).
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub output_dir: PathBuf,
    /// 0 = unlimited.
    pub max_messages: i64,
    /// Defer extension-less attachments to content sniffing.
    pub post_process: bool,
    /// Keep the staging directory after promotion.
    pub keep_temp: bool,
    /// Keep the HTML body on decoded messages.
    pub keep_html: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Maximum message size in bytes (default: 268435456 = 256 MB).
    pub max_message_size: usize,
    /// Log a progress line every N messages.
    pub progress_interval: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_messages: 0,
            post_process: false,
            keep_temp: false,
            keep_html: false,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            progress_interval: 100,
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    let Some(path) = config_file_path() else {
        return Config::default();
    };
    if !path.exists() {
        return Config::default();
    }
    match load_config_from(&path) {
        Ok(cfg) => {
            tracing::info!(path = %path.display(), "Loaded config");
            cfg
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to load config, using defaults"
            );
            Config::default()
        }
    }
}

/// Parse the configuration file at `path`.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| MboxError::io(path, e))?;
    toml::from_str(&contents).map_err(|e| MboxError::InvalidConfig(e.to_string()))
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOXEXTRACT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mboxextract").join("config.toml"))
}

/// Directory for the log file.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxextract")
}

/// Resolved settings for one extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorConfig {
    /// MBOX file to read. Must exist.
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
    /// Reserved for writing a rewritten mailbox; not used yet.
    pub output_mbox: PathBuf,
    /// 0 = unlimited, negative values are rejected by [`validate`](Self::validate).
    pub max_messages: i64,
    /// Log full error chains for failed messages.
    pub verbose: bool,
    pub post_process: bool,
    pub keep_temp: bool,
    pub keep_html: bool,
    pub max_message_size: usize,
    pub progress_interval: u64,
}

impl ProcessorConfig {
    /// Run configuration for `input_file` with file-level defaults applied.
    pub fn from_config(input_file: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            input_file: input_file.into(),
            output_dir: config.extract.output_dir.clone(),
            output_mbox: PathBuf::from(DEFAULT_OUTPUT_MBOX),
            max_messages: config.extract.max_messages,
            verbose: false,
            post_process: config.extract.post_process,
            keep_temp: config.extract.keep_temp,
            keep_html: config.extract.keep_html,
            max_message_size: config.performance.max_message_size,
            progress_interval: config.performance.progress_interval.max(1),
        }
    }

    /// Run configuration with built-in defaults.
    pub fn new(input_file: impl Into<PathBuf>) -> Self {
        Self::from_config(input_file, &Config::default())
    }

    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.input_file.exists() {
            return Err(MboxError::FileNotFound(self.input_file.clone()));
        }
        if !self.input_file.is_file() {
            return Err(MboxError::InvalidMbox(self.input_file.clone()));
        }
        if self.max_messages < 0 {
            return Err(MboxError::InvalidConfig(format!(
                "max_messages must be 0 (unlimited) or positive, got {}",
                self.max_messages
            )));
        }
        if self.max_message_size == 0 {
            return Err(MboxError::InvalidConfig(
                "max_message_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Positive message ceiling, if any.
    pub fn message_limit(&self) -> Option<u64> {
        u64::try_from(self.max_messages).ok().filter(|&n| n > 0)
    }

    /// `{output_dir}/attachments`
    pub fn attachments_dir(&self) -> PathBuf {
        self.output_dir.join("attachments")
    }

    /// `{output_dir}/attachments/temp`
    pub fn staging_dir(&self) -> PathBuf {
        self.attachments_dir().join(STAGING_DIR_NAME)
    }
}
