use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum LoggerError {
    #[error("Logger Error: {message} {location}")]
    Initialize {
        message: String,
        location: ErrorLocation,
    },
}
