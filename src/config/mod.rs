use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

fn default_lock_wait_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    150
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub database: String,
    /// Bounded wait for the per-operator mutation lock before giving up
    /// with a retryable conflict.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    /// Suggested interval for collaborators polling `last_changed_at`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: Self::database_file().to_string_lossy().to_string(),
            lock_wait_ms: default_lock_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Config {
    /// Return the standard configuration directory depending on the platform
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(appdata).join("tallyboard")
        } else {
            let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".tallyboard")
        }
    }

    /// Return the full path of the config file
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.yaml")
    }

    /// Default database location, next to the config file.
    pub fn database_file() -> PathBuf {
        Self::config_dir().join("tallyboard.sqlite")
    }

    /// Load the configuration, falling back to defaults when the file does
    /// not exist yet or cannot be parsed.
    pub fn load() -> Self {
        let path = Self::config_file();
        match fs::read_to_string(&path) {
            Ok(raw) => serde_yaml::from_str(&raw).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> AppResult<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;
        let raw = serde_yaml::to_string(self).map_err(|_| AppError::ConfigSave)?;
        fs::write(Self::config_file(), raw)?;
        Ok(())
    }
}
