//! Configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub login_item: LoginItemConfig,
}

/// History storage and polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of snippets kept
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Pasteboard polling period in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// SQLite database holding the history (default: <data dir>/history.db)
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            database: default_database(),
        }
    }
}

fn default_capacity() -> usize {
    crate::services::history::DEFAULT_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    crate::services::watcher::DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_database() -> String {
    Config::data_dir()
        .join("history.db")
        .to_string_lossy()
        .to_string()
}

/// Display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Date format string
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Characters of each snippet shown in lists
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_date_format() -> String {
    "%m/%d %H:%M".to_string()
}

fn default_preview_chars() -> usize {
    80
}

/// LaunchAgent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginItemConfig {
    /// launchd label, also the plist file name
    #[serde(default = "default_label")]
    pub label: String,
    /// launchctl binary
    #[serde(default = "default_launchctl")]
    pub launchctl: String,
    /// Override for ~/Library/LaunchAgents
    #[serde(default)]
    pub agents_dir: Option<String>,
}

impl Default for LoginItemConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            launchctl: default_launchctl(),
            agents_dir: None,
        }
    }
}

fn default_label() -> String {
    "com.ench.KimchiPaste".to_string()
}

fn default_launchctl() -> String {
    "/bin/launchctl".to_string()
}

impl Config {
    /// Load configuration from default location.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            Self::from_file(&config_path.to_string_lossy())
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: &str) -> Result<Self> {
        let expanded = expand_path(path);
        let content = std::fs::read_to_string(&expanded)
            .with_context(|| format!("reading config {}", expanded))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing config {}", expanded))?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("kimchi-paste")
            .join("config.toml")
    }

    /// Get the data directory for the history database and logs.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("kimchi-paste")
    }

    /// Resolved path of the history database.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(expand_path(&self.history.database))
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.history.poll_interval_ms.max(1))
    }
}

/// Expand ~ to home directory.
pub fn expand_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.history.capacity, 10);
        assert_eq!(config.history.poll_interval_ms, 500);
        assert_eq!(config.login_item.label, "com.ench.KimchiPaste");
        assert!(config.login_item.agents_dir.is_none());
    }

    #[test]
    fn test_default_poll_interval_matches_watcher() {
        assert_eq!(
            Config::default().poll_interval(),
            crate::services::watcher::DEFAULT_POLL_INTERVAL
        );
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [history]
            capacity = 25

            [display]
            preview_chars = 40
            "#,
        )
        .unwrap();
        assert_eq!(config.history.capacity, 25);
        assert_eq!(config.history.poll_interval_ms, 500);
        assert_eq!(config.display.preview_chars, 40);
        assert_eq!(config.display.date_format, "%m/%d %H:%M");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[history]\ndatabase = \"/tmp/kp.db\"\n").unwrap();

        let config = Config::from_file(&path.to_string_lossy()).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/kp.db"));
    }

    #[test]
    fn test_expand_path_leaves_absolute_paths() {
        assert_eq!(expand_path("/etc/hosts"), "/etc/hosts");
    }
}
