use common::ErrorLocation;

use std::error::Error as StdError;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum DiscoveryError {
    #[error("Not Running Error: {message} {location}")]
    NotRunning {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    #[error("Network Query Error: {message} {location}")]
    NetworkQuery {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}
