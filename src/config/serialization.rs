//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::{Config, ENV_HISTORY_DIR, ENV_NO_LOG, VERSION};

impl Config {
    /// Serialize config to TOML string (single source of truth for format)
    pub fn to_toml(&self) -> String {
        format!(
            r#"# httpdash {version} configuration

# Root of the response history; files land in <history_dir>/<yyyy-MM-dd>/<tab>/
# Overridden by {env_history}
history_dir = {history_dir}

# Keep response bodies in memory only, never write them to history
# Overridden by {env_no_log}=1
no_log = {no_log}

# Height of the preview pane next to HTML, PDF and image responses
preview_height = {preview_height}

# Logging configuration (RUST_LOG env var overrides level)
[logging]
level = {log_level}
# JSON file logging in addition to stderr
file_enabled = {log_file_enabled}
file_dir = {log_file_dir}
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = {log_file_prefix}
"#,
            version = VERSION,
            env_history = ENV_HISTORY_DIR,
            env_no_log = ENV_NO_LOG,
            history_dir = toml_path(&self.history_dir),
            no_log = self.no_log,
            preview_height = self.preview_height,
            log_level = toml_string(&self.logging.level),
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = toml_path(&self.logging.file_dir),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = toml_string(&self.logging.file_prefix),
        )
    }

    /// Save current configuration to file
    pub fn save(&self) -> Result<(), std::io::Error> {
        let Some(path) = Self::config_path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config path",
            ));
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, self.to_toml())
    }
}

/// Quoted TOML string; the encoder picks literal or escaped form
fn toml_string(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

fn toml_path(path: &std::path::Path) -> String {
    toml_string(&path.display().to_string())
}
