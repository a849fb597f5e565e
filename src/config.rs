//! TOML configuration.
//!
//! Read from `~/.config/recall/config.toml` unless `RECALL_CONFIG` points
//! elsewhere. A missing file means defaults. `RECALL_DB` overrides the
//! database location regardless of what the file says.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::DEFAULT_NEW_CARD_CAP;

pub const CONFIG_ENV: &str = "RECALL_CONFIG";
pub const DB_ENV: &str = "RECALL_DB";
const APP_DIR: &str = "recall";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DB_NAME: &str = "recall.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Upper bound on new cards pulled into one study session.
    #[serde(default = "default_new_cards_per_session")]
    pub new_cards_per_session: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

fn default_new_cards_per_session() -> usize {
    DEFAULT_NEW_CARD_CAP
}

impl Default for Config {
    fn default() -> Self {
        Self {
            new_cards_per_session: default_new_cards_per_session(),
            database_path: None,
        }
    }
}

impl Config {
    /// Loads from `RECALL_CONFIG` or the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Config = toml::from_str(&content)?;
                debug!("loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => app_dir().join(CONFIG_FILE),
        }
    }

    /// Where the database lives: `RECALL_DB`, then the config file, then the
    /// app directory.
    pub fn database_path(&self) -> PathBuf {
        self.database_path_with(std::env::var_os(DB_ENV).map(PathBuf::from))
    }

    fn database_path_with(&self, env_override: Option<PathBuf>) -> PathBuf {
        env_override
            .or_else(|| self.database_path.clone())
            .unwrap_or_else(|| {
                let dir = app_dir();
                fs::create_dir_all(&dir).ok();
                dir.join(DEFAULT_DB_NAME)
            })
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
