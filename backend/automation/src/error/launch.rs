use common::ErrorLocation;

use std::error::Error as StdError;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum LaunchError {
    #[error("Resolution Error: {message} {location}")]
    Resolution {
        message: String,
        location: ErrorLocation,
    },

    #[error("Launch Timeout Error: {message} {location}")]
    Timeout {
        message: String,
        location: ErrorLocation,
    },

    #[error("Launch Error: {message} (error code {code}) {location}")]
    Wait {
        message: String,
        code: u32,
        location: ErrorLocation,
    },

    #[error("Spawn Error: {message} {location}")]
    Spawn {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Shared Memory Error: {message} {location}")]
    SharedMemory {
        message: String,
        location: ErrorLocation,
    },
}
