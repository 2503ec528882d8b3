use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection_manager::{ConnectionMode, ConnectionOptions, IN_MEMORY_PATH};
use crate::query_runner::DEFAULT_ROW_LIMIT;

pub const MAX_RECENT_DATABASES: usize = 10;

const SETTINGS_FILE_NAME: &str = "settings.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecentDatabase {
    pub path: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub mode: ConnectionMode,
    pub last_opened: DateTime<Utc>,
}

impl RecentDatabase {
    #[must_use]
    pub fn to_options(&self) -> ConnectionOptions {
        let mut options = ConnectionOptions::new(self.path.clone());
        options.read_only = self.read_only;
        options.mode = self.mode;
        options
    }

    fn still_exists(&self) -> bool {
        self.path == IN_MEMORY_PATH || Path::new(&self.path).exists()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudioSettings {
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    #[serde(default)]
    pub open_last_on_start: bool,
    #[serde(default)]
    pub recent: Vec<RecentDatabase>,
}

fn default_row_limit() -> usize {
    DEFAULT_ROW_LIMIT
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            row_limit: DEFAULT_ROW_LIMIT,
            open_last_on_start: false,
            recent: Vec::new(),
        }
    }
}

impl StudioSettings {
    fn normalize(&mut self) {
        self.row_limit = self.row_limit.max(1);
        self.recent
            .sort_by(|left, right| right.last_opened.cmp(&left.last_opened));
        let mut seen = std::collections::HashSet::new();
        self.recent.retain(|entry| seen.insert(entry.path.clone()));
        self.recent.truncate(MAX_RECENT_DATABASES);
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read settings file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write settings file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
    settings: StudioSettings,
}

impl FileSettingsStore {
    pub fn load_default() -> Result<Self, SettingsError> {
        let path = default_settings_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                settings: StudioSettings::default(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                settings: StudioSettings::default(),
            });
        }

        let mut settings: StudioSettings =
            toml::from_str(&raw).map_err(|source| SettingsError::Parse {
                path: path.clone(),
                source,
            })?;
        settings.normalize();

        Ok(Self { path, settings })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn settings(&self) -> &StudioSettings {
        &self.settings
    }

    pub fn set_row_limit(&mut self, row_limit: usize) {
        self.settings.row_limit = row_limit.max(1);
    }

    pub fn set_open_last_on_start(&mut self, enabled: bool) {
        self.settings.open_last_on_start = enabled;
    }

    pub fn record_connection(&mut self, options: &ConnectionOptions, opened_at: DateTime<Utc>) {
        self.settings
            .recent
            .retain(|entry| entry.path != options.path);
        self.settings.recent.insert(
            0,
            RecentDatabase {
                path: options.path.clone(),
                read_only: options.read_only,
                mode: options.mode,
                last_opened: opened_at,
            },
        );
        self.settings.recent.truncate(MAX_RECENT_DATABASES);
    }

    pub fn validate_history(&mut self) -> usize {
        let before = self.settings.recent.len();
        self.settings.recent.retain(RecentDatabase::still_exists);
        before - self.settings.recent.len()
    }

    pub fn clear_history(&mut self) {
        self.settings.recent.clear();
    }

    #[must_use]
    pub fn last_connection(&self) -> Option<&RecentDatabase> {
        self.settings.recent.first()
    }

    pub fn persist(&self) -> Result<(), SettingsError> {
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| SettingsError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = toml::to_string_pretty(&self.settings)
            .map_err(|source| SettingsError::Serialize { source })?;

        fs::write(&self.path, rendered).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// `doclens/` under `DOCLENS_CONFIG_DIR`, `%APPDATA%`, `XDG_CONFIG_HOME` or `~/.config`.
pub fn default_config_dir() -> Result<PathBuf, SettingsError> {
    let base_dir = if let Some(custom) = env::var_os("DOCLENS_CONFIG_DIR") {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(SettingsError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(SettingsError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("doclens"))
}

pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    Ok(default_config_dir()?.join(SETTINGS_FILE_NAME))
}
