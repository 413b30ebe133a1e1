use crate::application::ExitPolicy;
use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{LevelFilter, info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "automation.json";
const CONFIG_DIR_NAME: &str = "flexlogger-automation";
const CONFIG_VERSION: u32 = 1;
const MAX_LAUNCH_TIMEOUT_SECS: u64 = 600;

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub executable_path: Option<PathBuf>,
    #[serde(default)]
    pub allow_prototype: bool,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            executable_path: None,
            allow_prototype: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default)]
    pub exit_policy: ExitPolicy,
    /// Overrides the port file FlexLogger writes under ProgramData.
    pub port_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingSettings {
    pub fn level_filter(&self) -> Option<LevelFilter> {
        self.level.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub launch: LaunchSettings,

    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            launch: LaunchSettings::default(),
            connection: ConnectionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_timeout_secs() -> u64 {
    40
}
fn default_log_level() -> String {
    "info".to_string()
}

// ============================================
// IMPLEMENTATION
// ============================================

impl AutomationConfig {
    /// The per-user configuration directory, `{config_dir}/flexlogger-automation`.
    #[track_caller]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME))
            .ok_or_else(|| ConfigError::DirectoryNotFound {
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Load config from {config_dir}/automation.json.
    ///
    /// # Returns
    ///
    /// Returns `Ok(AutomationConfig)` if loaded successfully or defaults if the file is missing.
    /// Returns `Err(ConfigError)` if the file exists but is corrupted or invalid.
    #[track_caller]
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {}", e);
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config: AutomationConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config JSON: {}", e);
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to {config_dir}/automation.json using atomic write.
    ///
    /// Uses temp file + rename so a crash never leaves a truncated file.
    #[track_caller]
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{}.tmp", CONFIG_FILE_NAME));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    #[track_caller]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid version: {} (expected 1-{})",
                    self.version, CONFIG_VERSION
                ),
            });
        }

        if self.launch.timeout_secs == 0 || self.launch.timeout_secs > MAX_LAUNCH_TIMEOUT_SECS {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid launch timeout: {}s (must be 1-{MAX_LAUNCH_TIMEOUT_SECS})",
                    self.launch.timeout_secs
                ),
            });
        }

        if let Some(ref path) = self.launch.executable_path
            && path.as_os_str().is_empty()
        {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "executable_path cannot be empty".to_string(),
            });
        }

        if self.logging.level_filter().is_none() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("Invalid log level: {}", self.logging.level),
            });
        }

        Ok(())
    }
}
