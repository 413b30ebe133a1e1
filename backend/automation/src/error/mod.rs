pub mod config;
pub mod connection;
pub mod discovery;
pub mod launch;
pub mod logger;
pub mod validation;

use thiserror::Error;

/// Umbrella error returned by the public API.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error(transparent)]
    Launch(#[from] launch::LaunchError),

    #[error(transparent)]
    Discovery(#[from] discovery::DiscoveryError),

    #[error(transparent)]
    Connection(#[from] connection::ConnectionError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Validation(#[from] validation::ValidationError),

    #[error(transparent)]
    Logger(#[from] logger::LoggerError),
}

impl AutomationError {
    /// True when the operation was rejected because the application was
    /// already closed or disconnected.
    pub fn is_already_closed(&self) -> bool {
        matches!(
            self,
            AutomationError::Connection(connection::ConnectionError::AlreadyClosed { .. })
        )
    }

    /// Host error code of a failed remote call, `0` for every other error.
    pub fn error_code(&self) -> i32 {
        match self {
            AutomationError::Connection(connection::ConnectionError::Rpc { details, .. }) => {
                details.error_code()
            }
            _ => 0,
        }
    }
}
