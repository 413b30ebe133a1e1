use crate::error::discovery::DiscoveryError;

use common::ErrorLocation;

use std::env::var_os;
use std::panic::Location;
use std::path::{Path, PathBuf};

use log::debug;

const PROGRAM_DATA_ENV: &str = "ProgramData";
const DEFAULT_PROGRAM_DATA_DIR: &str = r"C:\ProgramData";
const PORT_FILE_COMPONENTS: [&str; 3] = ["National Instruments", "FlexLogger", "LastAutomationPort.txt"];
const NOT_RUNNING_MESSAGE: &str = "No running FlexLogger detected. If FlexLogger is running, this might mean the \
     automation server is not enabled. To turn on the automation server, see the General tab of the \
     Preferences in FlexLogger.";

/// The port file FlexLogger writes under the machine-wide application data directory.
pub fn default_port_file_path() -> PathBuf {
    let program_data = var_os(PROGRAM_DATA_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM_DATA_DIR));

    PORT_FILE_COMPONENTS
        .iter()
        .fold(program_data, |path, component| path.join(component))
}

/// Read the automation port of a running FlexLogger from its port file.
///
/// # Errors
///
/// Returns [`DiscoveryError::NotRunning`] if the file is missing, unreadable or does
/// not hold an integer.
#[track_caller]
pub fn read_port_file(path: &Path) -> Result<i32, DiscoveryError> {
    if !path.exists() {
        debug!("Port file {} not found", path.display());
        return Err(DiscoveryError::NotRunning {
            message: NOT_RUNNING_MESSAGE.to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: None,
        });
    }

    let text = std::fs::read_to_string(path).map_err(|e| DiscoveryError::NotRunning {
        message: format!(
            "Failed to read automation port from running FlexLogger: {}",
            path.display()
        ),
        location: ErrorLocation::from(Location::caller()),
        source: Some(Box::new(e)),
    })?;

    let port = text
        .trim()
        .parse::<i32>()
        .map_err(|e| DiscoveryError::NotRunning {
            message: format!(
                "Failed to read automation port from running FlexLogger: '{}' is not a port",
                text.trim()
            ),
            location: ErrorLocation::from(Location::caller()),
            source: Some(Box::new(e)),
        })?;

    debug!("Detected FlexLogger automation port {port} from {}", path.display());
    Ok(port)
}

/// Detect the automation port of a running FlexLogger instance.
#[track_caller]
pub fn detect_running_instance() -> Result<i32, DiscoveryError> {
    read_port_file(&default_port_file_path())
}
