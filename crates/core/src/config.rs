use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::{DelayStrategy, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY};
use crate::fixtures::{FixtureError, FixtureStore};
use crate::layout::{Layout, LayoutDirection, DEFAULT_SIDEBAR_WIDTH, DEFAULT_SPLIT_PERCENT};

pub const CONFIG_DIR_ENV: &str = "SQLPAD_CONFIG_DIR";
const APP_DIR_NAME: &str = "sqlpad";
const CONFIG_FILE_NAME: &str = "config.toml";
const LOG_FILE_NAME: &str = "sqlpad.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("execution delay range is empty: min_delay_ms={min_delay_ms} must be below max_delay_ms={max_delay_ms}")]
    InvalidDelayRange { min_delay_ms: u64, max_delay_ms: u64 },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load fixtures: {0}")]
    Fixtures(#[from] FixtureError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionSettings {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: duration_ms(DEFAULT_MIN_DELAY),
            max_delay_ms: duration_ms(DEFAULT_MAX_DELAY),
        }
    }
}

impl ExecutionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay_ms >= self.max_delay_ms {
            return Err(ConfigError::InvalidDelayRange {
                min_delay_ms: self.min_delay_ms,
                max_delay_ms: self.max_delay_ms,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn delay_strategy(&self) -> DelayStrategy {
        DelayStrategy::Random {
            min: Duration::from_millis(self.min_delay_ms),
            max: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct HistorySettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixtureSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub include_generated: bool,
}

impl Default for FixtureSettings {
    fn default() -> Self {
        Self {
            path: None,
            include_generated: true,
        }
    }
}

impl FixtureSettings {
    pub fn load(&self) -> Result<FixtureStore, ConfigError> {
        let mut store = match &self.path {
            Some(path) => FixtureStore::load_from_path(path)?,
            None => FixtureStore::builtin()?,
        };
        if self.include_generated {
            store.add_generated_datasets();
        }
        Ok(store)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutSettings {
    pub direction: LayoutDirection,
    pub split_percent: f64,
    pub sidebar_open: bool,
    pub sidebar_width: u16,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::Vertical,
            split_percent: DEFAULT_SPLIT_PERCENT,
            sidebar_open: false,
            sidebar_width: DEFAULT_SIDEBAR_WIDTH,
        }
    }
}

impl LayoutSettings {
    #[must_use]
    pub fn build(&self) -> Layout {
        Layout::new(
            self.direction,
            self.split_percent,
            self.sidebar_open,
            self.sidebar_width,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub execution: ExecutionSettings,
    pub history: HistorySettings,
    pub fixtures: FixtureSettings,
    pub layout: LayoutSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct WorkbenchConfig {
    path: PathBuf,
    settings: Settings,
}

impl WorkbenchConfig {
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                settings: Settings::default(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                settings: Settings::default(),
            });
        }

        let settings: Settings = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        settings.execution.validate()?;

        Ok(Self { path, settings })
    }

    #[must_use]
    pub fn with_settings(path: impl Into<PathBuf>, settings: Settings) -> Self {
        Self {
            path: path.into(),
            settings,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path
            .parent()
            .map_or_else(|| PathBuf::from(LOG_FILE_NAME), |dir| dir.join(LOG_FILE_NAME))
    }

    pub fn persist(&self) -> Result<(), ConfigError> {
        self.settings.execution.validate()?;
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| ConfigError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = toml::to_string_pretty(&self.settings)
            .map_err(|source| ConfigError::Serialize { source })?;

        fs::write(&self.path, rendered).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = if let Some(custom) = env::var_os(CONFIG_DIR_ENV) {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ConfigError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ConfigError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join(APP_DIR_NAME))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_config_dir()?.join(CONFIG_FILE_NAME))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
