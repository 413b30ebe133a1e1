use crate::config::LaunchSettings;
use crate::error::validation::ValidationError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(40);

/// How to launch a new FlexLogger instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    timeout: Duration,
    executable_path: Option<PathBuf>,
    allow_prototype: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LAUNCH_TIMEOUT,
            executable_path: None,
            allow_prototype: false,
        }
    }
}

impl LaunchOptions {
    pub fn builder() -> LaunchOptionsBuilder {
        LaunchOptionsBuilder::default()
    }

    /// Options described by the `launch` section of the configuration file.
    #[track_caller]
    pub fn from_config(settings: &LaunchSettings) -> Result<Self, ValidationError> {
        let mut builder = LaunchOptionsBuilder::default()
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .with_allow_prototype(settings.allow_prototype);

        if let Some(path) = &settings.executable_path {
            builder = builder.with_path(path);
        }

        builder.build()
    }

    /// How long to wait for FlexLogger to signal that it is ready.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The executable (or its install directory) to launch. `None` launches the
    /// latest installed version.
    pub fn executable_path(&self) -> Option<&Path> {
        self.executable_path.as_deref()
    }

    pub fn allow_prototype(&self) -> bool {
        self.allow_prototype
    }
}

/// Builder for validated [`LaunchOptions`].
#[derive(Debug, Default)]
pub struct LaunchOptionsBuilder {
    timeout: Option<Duration>,
    executable_path: Option<PathBuf>,
    allow_prototype: Option<bool>,
}

impl LaunchOptionsBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    pub fn with_allow_prototype(mut self, allow: bool) -> Self {
        self.allow_prototype = Some(allow);
        self
    }

    /// Build the options with validation.
    #[track_caller]
    pub fn build(self) -> Result<LaunchOptions, ValidationError> {
        let timeout = self.timeout.unwrap_or(DEFAULT_LAUNCH_TIMEOUT);

        if timeout.is_zero() {
            return Err(ValidationError::Invalid {
                message: String::from("Launch timeout must be non-zero"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if let Some(path) = &self.executable_path
            && path.as_os_str().is_empty()
        {
            return Err(ValidationError::Invalid {
                message: String::from("Executable path cannot be empty"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(LaunchOptions {
            timeout,
            executable_path: self.executable_path,
            allow_prototype: self.allow_prototype.unwrap_or(false),
        })
    }
}
