use common::{ErrorLocation, HostErrorDetails};

use std::error::Error as StdError;
use std::panic::Location;

use thiserror::Error as ThisError;
use tonic::{Code, Status};

const ADDITIONAL_DETAILS_SEPARATOR: &str = ". Additional error details: ";

#[derive(Debug, ThisError)]
pub enum ConnectionError {
    #[error("Invalid Port Error: {message} {location}")]
    InvalidPort {
        port: i32,
        message: String,
        location: ErrorLocation,
    },

    #[error("Channel Error: {message} {location}")]
    Channel {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Already Closed Error: Application has already been disconnected {location}")]
    AlreadyClosed { location: ErrorLocation },

    #[error("RPC Error: {message} {location}")]
    Rpc {
        message: String,
        code: Code,
        details: HostErrorDetails,
        location: ErrorLocation,
    },
}

impl ConnectionError {
    #[track_caller]
    pub fn already_closed() -> Self {
        ConnectionError::AlreadyClosed {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn invalid_port(port: i32) -> Self {
        ConnectionError::InvalidPort {
            port,
            message: format!("Tried to connect to invalid port number {port}"),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Wrap a failed remote call.
    ///
    /// `operation` is the caller-facing summary ("Failed to open project").
    /// Host diagnostics found in the status message are appended to it.
    #[track_caller]
    pub fn from_status(operation: impl Into<String>, status: &Status) -> Self {
        let details = HostErrorDetails::parse(status.message());
        let mut message = operation.into();

        if !details.is_empty() {
            message.push_str(ADDITIONAL_DETAILS_SEPARATOR);
            message.push_str(details.message());
        }

        ConnectionError::Rpc {
            message,
            code: status.code(),
            details,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
