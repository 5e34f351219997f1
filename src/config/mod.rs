//! Configuration for the dashboard
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/httpdash/config.toml)
//! 3. Built-in defaults (lowest priority)

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod observability;
mod serialization;


pub use observability::{FileLogging, LogRotation, LoggingConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Height of the preview pane shown next to HTML, PDF and image responses
pub const DEFAULT_PREVIEW_HEIGHT: u32 = crate::composer::DEFAULT_PREVIEW_HEIGHT;

/// Environment overrides
pub const ENV_HISTORY_DIR: &str = "HTTPDASH_HISTORY_DIR";
pub const ENV_NO_LOG: &str = "HTTPDASH_NO_LOG";
pub const ENV_PREVIEW_HEIGHT: &str = "HTTPDASH_PREVIEW_HEIGHT";

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root of the durable response history (dated subdirectories live here)
    pub history_dir: PathBuf,

    /// Keep response bodies in memory only
    pub no_log: bool,

    /// Preview pane height for previewable responses
    pub preview_height: u32,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_dir: default_history_dir(),
            no_log: false,
            preview_height: DEFAULT_PREVIEW_HEIGHT,
            logging: LoggingConfig::default(),
        }
    }
}

fn default_history_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("httpdash").join("history"))
        .unwrap_or_else(|| PathBuf::from("./history"))
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub history_dir: Option<String>,
    pub no_log: Option<bool>,
    pub preview_height: Option<u32>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// A config file exists but cannot be used
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => {
                writeln!(f, "CONFIG ERROR - Cannot read configuration file")?;
                writeln!(f, "  File: {}", path.display())?;
                write!(f, "  Error: {}", source)
            }
            Self::Parse { path, source } => {
                writeln!(f, "CONFIG ERROR - Failed to parse configuration file")?;
                writeln!(f, "  File: {}", path.display())?;
                writeln!(f, "  Error: {}", source)?;
                writeln!(f, "  Tip: check for missing quotes around strings, invalid")?;
                writeln!(f, "  booleans (use true/false) and typos in section names.")?;
                write!(f, "  To reset, run `httpdash config --reset`.")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/httpdash/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("httpdash").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // config is optional
            }
        }

        // Config::default().to_toml() is the single source of truth
        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Parse a config file; a missing file yields defaults
    pub(crate) fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Load configuration: env vars > file > defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match Self::config_path() {
            Some(path) => Self::load_file_config(&path)?,
            None => FileConfig::default(),
        };

        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    /// Merge a parsed file with an environment lookup
    pub(crate) fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        // History directory: env > file > default
        let history_dir = env(ENV_HISTORY_DIR)
            .or(file.history_dir)
            .map(PathBuf::from)
            .unwrap_or(defaults.history_dir);

        // No-log: env > file > default
        let no_log = env(ENV_NO_LOG)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .or(file.no_log)
            .unwrap_or(defaults.no_log);

        // Preview height: env > file > default, zero is not a usable height
        let preview_height = env(ENV_PREVIEW_HEIGHT)
            .and_then(|v| v.parse().ok())
            .or(file.preview_height)
            .filter(|h| *h > 0)
            .unwrap_or(defaults.preview_height);

        let logging = LoggingConfig::from_file(file.logging);

        Self {
            history_dir,
            no_log,
            preview_height,
            logging,
        }
    }
}
