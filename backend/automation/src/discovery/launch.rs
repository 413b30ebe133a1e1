use crate::application::options::LaunchOptions;
use crate::discovery::Platform;
use crate::discovery::registry::resolve_executable_path;
use crate::discovery::rendezvous::{ReadyEvent, WaitOutcome};
use crate::error::launch::LaunchError;

use common::ErrorLocation;

use std::ffi::OsStr;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info, trace};
use tokio::process::Command as TokioCommand;
use tokio::time::{Instant, sleep};
use uuid::Uuid;

pub const LAUNCH_POLL_INTERVAL: Duration = Duration::from_millis(200);
const READY_EVENT_NAME_FLAG: &str = "-mappedFileIsReadyEventName=";
const MAPPED_FILE_NAME_FLAG: &str = "-mappedFileName=";
const ENABLE_AUTOMATION_SERVER_FLAG: &str = "-enableAutomationServer";
const ALLOW_PROTOTYPE_FLAG: &str = "-allowPrototype";

/// One-time names used to rendezvous with a launching FlexLogger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryToken {
    pub event_name: String,
    pub mapped_file_name: String,
}

impl DiscoveryToken {
    pub fn generate() -> Self {
        Self {
            event_name: Uuid::new_v4().simple().to_string(),
            mapped_file_name: Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Program and arguments used to start FlexLogger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn to_command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl std::fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

pub(crate) fn build_launch_command(
    executable: &Path,
    token: &DiscoveryToken,
    allow_prototype: bool,
) -> LaunchCommand {
    let mut args = vec![
        format!("{READY_EVENT_NAME_FLAG}{}", token.event_name),
        format!("{MAPPED_FILE_NAME_FLAG}{}", token.mapped_file_name),
        ENABLE_AUTOMATION_SERVER_FLAG.to_string(),
    ];

    if allow_prototype {
        args.push(ALLOW_PROTOTYPE_FLAG.to_string());
    }

    LaunchCommand {
        program: executable.to_path_buf(),
        args,
    }
}

/// Starts the FlexLogger process.
pub trait ProcessLauncher: Send + Sync {
    /// Spawn `command` detached, returning the child PID when the OS reports one.
    fn spawn(&self, command: &LaunchCommand) -> Result<Option<u32>, LaunchError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLauncher;

impl ProcessLauncher for NativeLauncher {
    fn spawn(&self, command: &LaunchCommand) -> Result<Option<u32>, LaunchError> {
        debug!("Spawning {command}");

        let child = command.to_command().spawn().map_err(|e| LaunchError::Spawn {
            message: format!(
                "Failed to launch {}: {e}",
                command.program.file_name().unwrap_or(OsStr::new("")).to_string_lossy()
            ),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(e),
        })?;

        // The child outlives this handle; FlexLogger keeps running after we detach.
        Ok(child.id())
    }
}

/// Poll the ready event until it signals or `timeout` elapses.
///
/// The event is checked every 200 ms, so the timeout fires no earlier than `timeout`
/// and no later than one poll interval after it. A timeout too large to represent as
/// a deadline waits indefinitely.
///
/// # Errors
///
/// * [`LaunchError::Timeout`] - The event was not signaled in time. This might mean an
///   instance of FlexLogger was already running.
/// * [`LaunchError::Wait`] - The wait itself failed.
pub async fn wait_for_ready(event: &dyn ReadyEvent, timeout: Duration) -> Result<(), LaunchError> {
    let deadline = Instant::now().checked_add(timeout);

    loop {
        match event.poll() {
            WaitOutcome::Signaled => return Ok(()),
            WaitOutcome::Pending => {}
            WaitOutcome::Failed(code) => {
                return Err(LaunchError::Wait {
                    message: "Internal error waiting for FlexLogger to launch".to_string(),
                    code,
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }

        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            return Err(LaunchError::Timeout {
                message: format!(
                    "Timed out after {timeout:?} waiting for FlexLogger to launch. This might mean an instance of FlexLogger was already running."
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let slice = deadline.map_or(LAUNCH_POLL_INTERVAL, |deadline| {
            LAUNCH_POLL_INTERVAL.min(deadline - now)
        });
        trace!("FlexLogger not ready, checking again in {slice:?}");
        sleep(slice).await;
    }
}

/// A FlexLogger process started by [`launch_host`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedHost {
    pub port: i32,
    pub pid: Option<u32>,
    pub executable: PathBuf,
}

/// Launch FlexLogger and wait for it to publish its automation port.
///
/// The executable is resolved before anything is created or spawned. The ready
/// event is released on every return path.
pub async fn launch_host(
    options: &LaunchOptions,
    platform: &Platform,
) -> Result<LaunchedHost, LaunchError> {
    let executable = resolve_executable_path(options.executable_path(), platform.registry.as_ref())?;
    let token = DiscoveryToken::generate();

    trace!("Launch rendezvous event={} mapping={}", token.event_name, token.mapped_file_name);

    let event = platform.rendezvous.create_ready_event(&token.event_name)?;
    let command = build_launch_command(&executable, &token, options.allow_prototype());

    info!("Launching FlexLogger from {}", executable.display());
    let pid = platform.launcher.spawn(&command)?;

    wait_for_ready(event.as_ref(), options.timeout()).await?;
    let port = platform.rendezvous.read_port(&token.mapped_file_name)?;
    drop(event);

    info!("FlexLogger ready on port {port} (PID: {pid:?})");

    Ok(LaunchedHost {
        port,
        pid,
        executable,
    })
}
