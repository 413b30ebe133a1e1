//! Logging setup for programs driving FlexLogger.
//!
//! The library itself only emits through the `log` facade. Scripts that want output
//! call [`initialize`] once to get coloured stdout plus a plain log file.

use crate::error::logger::LoggerError;

use common::ErrorLocation;

use std::fmt::Arguments;
use std::panic::Location;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use humantime::format_rfc3339_millis;
use log::{LevelFilter, Record, debug, info};

pub const LOG_FILE_NAME: &str = "flexlogger-automation.log";

/// Transport crates that log every frame at debug level.
const TRANSPORT_TARGETS: [&str; 4] = ["h2", "hyper", "hyper_util", "tower"];

/// Set while a logger is installed or being installed.
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the process-wide logger, writing to stdout and to
/// `{log_dir}/flexlogger-automation.log`.
///
/// Only the first successful call installs anything; later calls return Ok. A call
/// that fails leaves no logger behind, so it can be retried.
///
/// # Errors
///
/// Returns [`LoggerError::Initialize`] if the log file cannot be opened or another
/// logger already owns the `log` facade.
pub fn initialize(log_dir: &Path, level: LevelFilter) -> Result<(), LoggerError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        debug!("Logger already initialized, keeping the existing one");
        return Ok(());
    }

    if let Err(e) = install(log_dir, level) {
        INSTALLED.store(false, Ordering::SeqCst);
        return Err(e);
    }

    info!("Logging at {level} to {}", log_dir.join(LOG_FILE_NAME).display());
    Ok(())
}

#[track_caller]
fn install(log_dir: &Path, level: LevelFilter) -> Result<(), LoggerError> {
    let log_file = fern::log_file(log_dir.join(LOG_FILE_NAME)).map_err(|e| {
        LoggerError::Initialize {
            message: format!("Failed to open log file in {}: {e}", log_dir.display()),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    let console = Dispatch::new()
        .format(move |out, message, record| {
            write_line(out, colors.color(record.level()), message, record)
        })
        .chain(std::io::stdout());

    let file = Dispatch::new()
        .format(|out, message, record| write_line(out, record.level(), message, record))
        .chain(log_file);

    TRANSPORT_TARGETS
        .iter()
        .fold(Dispatch::new().level(level), |dispatch, target| {
            dispatch.level_for(*target, LevelFilter::Warn)
        })
        .chain(console)
        .chain(file)
        .apply()
        .map_err(|e| LoggerError::Initialize {
            message: format!("Another logger is already installed: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

/// `2024-05-01T12:00:00.123Z INFO  flexlogger_automation::application: message`
fn write_line(
    out: FormatCallback,
    level: impl std::fmt::Display,
    message: &Arguments,
    record: &Record,
) {
    out.finish(format_args!(
        "{} {:<5} {}: {}",
        format_rfc3339_millis(SystemTime::now()),
        level,
        record.target(),
        message
    ))
}
