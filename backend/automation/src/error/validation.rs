use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ValidationError {
    #[error("Validation Error: {message} {location}")]
    Invalid {
        message: String,
        location: ErrorLocation,
    },
}
