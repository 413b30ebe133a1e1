//! Shared primitives for the FlexLogger automation crates.
//!
//! Nothing in here talks to the host application. It holds the small value
//! types that every layer needs when reporting errors:
//!
//! - [`ErrorLocation`]: the file/line/column an error was raised from
//! - [`HostErrorDetails`]: the diagnostic text and code FlexLogger embeds in
//!   the detail string of a failed remote call

pub mod error;
pub mod host_error;


pub use error::error_location::ErrorLocation;
pub use host_error::HostErrorDetails;
