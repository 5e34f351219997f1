//! `[logging]` section: diagnostics for the dashboard itself
//!
//! These settings never touch tab logs. They control where httpdash's own
//! tracing output goes: always stderr, plus an optional JSON file.

use serde::Deserialize;
use std::path::PathBuf;
use tracing_appender::rolling::Rotation;

/// How often the JSON log file starts over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl LogRotation {
    /// Lenient: a typo in the config file must not stop the dashboard
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Self::Hourly,
            "never" => Self::Never,
            _ => Self::Daily,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Never => "never",
        }
    }

    pub fn rotation(&self) -> Rotation {
        match self {
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
            Self::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level for httpdash's own targets; other crates stay at warn
    pub level: String,
    pub file_enabled: bool,
    pub file_dir: PathBuf,
    pub file_rotation: LogRotation,
    /// Files are named `<prefix>.<date>.log`
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            file_dir: PathBuf::from("./logs"),
            file_rotation: LogRotation::Daily,
            file_prefix: "httpdash".to_string(),
        }
    }
}

/// `[logging]` as written in config.toml; every key optional
#[derive(Debug, Deserialize, Default)]
pub struct FileLogging {
    pub level: Option<String>,
    pub file_enabled: Option<bool>,
    pub file_dir: Option<String>,
    pub file_rotation: Option<String>,
    pub file_prefix: Option<String>,
}

impl LoggingConfig {
    pub fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            level: file.level.unwrap_or(defaults.level),
            file_enabled: file.file_enabled.unwrap_or(defaults.file_enabled),
            file_dir: file
                .file_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.file_dir),
            file_rotation: file
                .file_rotation
                .map(|s| LogRotation::parse(&s))
                .unwrap_or(defaults.file_rotation),
            // An empty prefix would produce files named `.<date>.log`
            file_prefix: file
                .file_prefix
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.file_prefix),
        }
    }
}
