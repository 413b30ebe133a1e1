pub mod application;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logger;
pub mod proto;


pub use application::guard::{ConnectionGuard, ConnectionState};
pub use application::options::{LaunchOptions, LaunchOptionsBuilder};
pub use application::project::Project;
pub use application::{Application, ExitPolicy};
pub use discovery::Platform;
pub use error::AutomationError;

pub const FLEXLOGGER_EXE_NAME: &str = "FlexLogger.exe";
pub const FLEXLOGGER_REGISTRY_KEY_PATH: &str = r"SOFTWARE\National Instruments\FlexLogger";
pub const AUTOMATION_SERVER_HOSTNAME: &str = "localhost";
pub const AUTOMATION_SERVER_BASE_URL: &str =
    const_format::concatcp!("http://", AUTOMATION_SERVER_HOSTNAME);
