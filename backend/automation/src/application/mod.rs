//! The FlexLogger application connection.
//!
//! An [`Application`] is created by launching FlexLogger ([`Application::launch`]),
//! by attaching to a known automation port ([`Application::attach`]), or by detecting
//! a running instance ([`Application::connect`], [`Application::connect_with_config`]).
//! It ends with [`Application::close`] or [`Application::disconnect`]; after either,
//! every call on the application and on the projects it handed out fails with an
//! already-closed error.
//!
//! # Exit policy
//!
//! Whether `close()` asks FlexLogger to exit is controlled by [`ExitPolicy`]. By default
//! only an application started with `launch()` is exited; an attached one is left
//! running.

pub mod guard;
pub mod options;
pub mod project;

use crate::AUTOMATION_SERVER_BASE_URL;
use crate::config::AutomationConfig;
use crate::discovery::Platform;
use crate::discovery::launch::launch_host;
use crate::discovery::port_file::{default_port_file_path, read_port_file};
use crate::discovery::process::{ProcessTable, SystemProcessTable, wait_for_exit};
use crate::error::AutomationError;
use crate::error::connection::ConnectionError;
use crate::proto::{
    ApplicationClient, DisconnectRequest, FlexLoggerApplicationClient, GetActiveProjectRequest,
    GetVersionRequest, OpenProjectRequest,
};

use guard::{CloseOnDrop, ConnectionGuard, ConnectionState, Lifecycle};
use options::LaunchOptions;
use project::Project;

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;
use tokio::time::sleep;
use tonic::Status;
use tonic::transport::{Channel, Endpoint};

/// FlexLogger can hang if a project is closed immediately after opening it.
const OPEN_PROJECT_SETTLE_TIME: Duration = Duration::from_secs(1);

/// When `close()` asks FlexLogger to exit and waits for its process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Exit only an application this connection launched.
    #[default]
    LaunchedOnly,
    /// Always exit, including applications that were attached to.
    Always,
}

impl ExitPolicy {
    pub fn exits_on_close(self, launched: bool) -> bool {
        match self {
            ExitPolicy::LaunchedOnly => launched,
            ExitPolicy::Always => true,
        }
    }
}

/// Wrap a failed remote call, preferring the already-closed error when the
/// connection was closed underneath it.
#[track_caller]
pub(crate) fn rpc_failure(
    guard: &dyn ConnectionGuard,
    operation: &str,
    status: &Status,
) -> AutomationError {
    if let Err(closed) = guard.raise_if_closed() {
        return closed;
    }
    ConnectionError::from_status(operation, status).into()
}

/// A connection to the FlexLogger automation server.
pub struct Application {
    channel: Option<Channel>,
    lifecycle: Arc<Lifecycle>,
    server_port: u16,
    host_pid: Option<u32>,
    launched: bool,
    exit_policy: ExitPolicy,
    processes: Arc<dyn ProcessTable>,
}

impl Application {
    /// Launch a new FlexLogger instance and connect to it.
    ///
    /// # Errors
    ///
    /// * Resolution error - No executable could be determined.
    /// * Launch timeout - FlexLogger did not signal readiness within the timeout.
    /// * Launch error - Spawning or the rendezvous wait failed.
    /// * Connection error - The channel could not be constructed.
    pub async fn launch(options: LaunchOptions) -> Result<Self, AutomationError> {
        Self::launch_with(options, &Platform::native()).await
    }

    /// [`Application::launch`] using the given platform facilities.
    pub async fn launch_with(
        options: LaunchOptions,
        platform: &Platform,
    ) -> Result<Self, AutomationError> {
        let host = launch_host(&options, platform).await?;

        let mut application = Self::open(host.port, Arc::clone(&platform.processes))?;
        application.launched = true;
        application.host_pid = host.pid;
        Ok(application)
    }

    /// Connect to a FlexLogger already listening on `port`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a connection error if `port` is not a valid TCP port or the channel
    /// cannot be constructed.
    pub async fn attach(port: i32) -> Result<Self, AutomationError> {
        Self::attach_with(port, Arc::new(SystemProcessTable)).await
    }

    /// [`Application::attach`] using the given process table.
    pub async fn attach_with(
        port: i32,
        processes: Arc<dyn ProcessTable>,
    ) -> Result<Self, AutomationError> {
        Self::open(port, processes)
    }

    /// Connect to the FlexLogger instance that is currently running.
    ///
    /// # Errors
    ///
    /// Returns a not-running error if no port file is found, in addition to the
    /// errors of [`Application::attach`].
    pub async fn connect() -> Result<Self, AutomationError> {
        Self::connect_with_port_file(&default_port_file_path()).await
    }

    /// [`Application::connect`] reading the port from `port_file`.
    pub async fn connect_with_port_file(port_file: &Path) -> Result<Self, AutomationError> {
        let port = read_port_file(port_file)?;
        Self::attach(port).await
    }

    /// [`Application::connect`] as described by the `connection` section of `config`.
    ///
    /// Reads the configured port file, falling back to the one FlexLogger writes, and
    /// applies the configured [`ExitPolicy`].
    pub async fn connect_with_config(config: &AutomationConfig) -> Result<Self, AutomationError> {
        let connection = &config.connection;
        let port_file = connection
            .port_file
            .clone()
            .unwrap_or_else(default_port_file_path);

        let application = Self::connect_with_port_file(&port_file).await?;
        Ok(application.with_exit_policy(connection.exit_policy))
    }

    #[track_caller]
    fn open(port: i32, processes: Arc<dyn ProcessTable>) -> Result<Self, AutomationError> {
        let server_port = u16::try_from(port)
            .ok()
            .filter(|&p| p > 0)
            .ok_or_else(|| ConnectionError::invalid_port(port))?;

        let channel = Self::create_channel(server_port)?;

        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.mark_connected();

        info!("Connected to FlexLogger automation server on port {server_port}");

        Ok(Self {
            channel: Some(channel),
            lifecycle,
            server_port,
            host_pid: None,
            launched: false,
            exit_policy: ExitPolicy::default(),
            processes,
        })
    }

    #[track_caller]
    fn create_channel(port: u16) -> Result<Channel, ConnectionError> {
        let endpoint = Endpoint::from_shared(format!("{AUTOMATION_SERVER_BASE_URL}:{port}"))
            .map_err(|e| ConnectionError::Channel {
                message: format!(
                    "Failed to connect to FlexLogger. Ensure the \"Automation server\" preference is enabled in the application: {e}"
                ),
                location: ErrorLocation::from(Location::caller()),
                source: Box::new(e),
            })?;

        Ok(endpoint.connect_lazy())
    }

    pub fn with_exit_policy(mut self, exit_policy: ExitPolicy) -> Self {
        self.exit_policy = exit_policy;
        self
    }

    /// The port the automation server is listening on.
    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// The automation server endpoint, e.g. `http://localhost:5005`.
    pub fn endpoint(&self) -> String {
        format!("{AUTOMATION_SERVER_BASE_URL}:{}", self.server_port)
    }

    /// True if this connection started FlexLogger with [`Application::launch`].
    pub fn launched(&self) -> bool {
        self.launched
    }

    /// PID of the FlexLogger process, known when it was launched by this connection.
    pub fn host_pid(&self) -> Option<u32> {
        self.host_pid
    }

    pub fn exit_policy(&self) -> ExitPolicy {
        self.exit_policy
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// The closed-connection check to hand to wrapper objects.
    pub fn guard(&self) -> Arc<dyn ConnectionGuard> {
        Arc::clone(&self.lifecycle) as Arc<dyn ConnectionGuard>
    }

    #[track_caller]
    fn channel(&self) -> Result<Channel, AutomationError> {
        self.lifecycle.raise_if_closed()?;
        self.channel
            .clone()
            .ok_or_else(|| ConnectionError::already_closed().into())
    }

    /// Open the project at `path`.
    pub async fn open_project(&self, path: impl AsRef<Path>) -> Result<Project, AutomationError> {
        let channel = self.channel()?;
        let path = path.as_ref();

        let response = FlexLoggerApplicationClient::new(channel.clone())
            .open_project(OpenProjectRequest {
                project_path: path.to_string_lossy().to_string(),
            })
            .await
            .map_err(|status| rpc_failure(self.lifecycle.as_ref(), "Failed to open project", &status))?
            .into_inner();

        info!("Opened project {}", path.display());
        sleep(OPEN_PROJECT_SETTLE_TIME).await;

        Ok(Project::new(
            channel,
            self.guard(),
            response.project.unwrap_or_default(),
        ))
    }

    /// The currently open project, or `None` if no project is open.
    pub async fn get_active_project(&self) -> Result<Option<Project>, AutomationError> {
        let channel = self.channel()?;
        get_active_project(&channel, &self.lifecycle).await
    }

    /// FlexLogger's version number and its marketing version string.
    pub async fn get_version(&self) -> Result<(String, String), AutomationError> {
        let channel = self.channel()?;

        let response = FlexLoggerApplicationClient::new(channel)
            .get_version(GetVersionRequest {})
            .await
            .map_err(|status| rpc_failure(self.lifecycle.as_ref(), "Failed to get version", &status))?
            .into_inner();

        Ok((response.version, response.version_string))
    }

    /// Disconnect and, as the [`ExitPolicy`] decides, exit FlexLogger.
    ///
    /// When FlexLogger is exited, the active project is closed first so no save prompt
    /// blocks the shutdown, and the call waits up to 60 s for the process to go away.
    /// An expired wait is logged, not reported.
    ///
    /// Further calls to this object fail.
    pub async fn close(&mut self) -> Result<(), AutomationError> {
        let exit_application = self.exit_policy.exits_on_close(self.launched);
        self.shutdown(exit_application).await
    }

    /// Disconnect from the automation server, leaving FlexLogger running.
    ///
    /// Further calls to this object fail.
    pub async fn disconnect(&mut self) -> Result<(), AutomationError> {
        self.shutdown(false).await
    }

    async fn shutdown(&mut self, exit_application: bool) -> Result<(), AutomationError> {
        let channel = self.channel()?;
        let lifecycle = Arc::clone(&self.lifecycle);
        let _closed = CloseOnDrop(lifecycle.as_ref());

        // Released here so nothing reaches the server through this application again.
        self.channel = None;

        let result = self.request_disconnect(&channel, exit_application).await;
        drop(channel);

        info!(
            "Disconnected from FlexLogger on port {} (exit_application={exit_application})",
            self.server_port
        );
        result
    }

    async fn request_disconnect(
        &self,
        channel: &Channel,
        exit_application: bool,
    ) -> Result<(), AutomationError> {
        let mut pid_to_wait_for = None;

        if exit_application {
            if let Some(project) = get_active_project(channel, &self.lifecycle).await? {
                project.close().await?;
            }
            pid_to_wait_for = self.find_host_pid().await;
        }

        ApplicationClient::new(channel.clone())
            .disconnect(DisconnectRequest { exit_application })
            .await
            .map_err(|status| rpc_failure(self.lifecycle.as_ref(), "Failed to disconnect", &status))?;

        if let Some(pid) = pid_to_wait_for {
            debug!("Waiting for FlexLogger (PID: {pid}) to exit");
            if !wait_for_exit(self.processes.as_ref(), pid).await {
                warn!("Continuing without confirming FlexLogger (PID: {pid}) exited");
            }
        }

        Ok(())
    }

    /// The socket and process tables are read on the blocking pool.
    async fn find_host_pid(&self) -> Option<u32> {
        let processes = Arc::clone(&self.processes);
        let port = self.server_port;
        let spawned_pid = self.host_pid;

        let lookup = spawn_blocking(move || {
            let spawned = || spawned_pid.filter(|&pid| processes.is_host_process(pid));

            match processes.find_host_pid(port) {
                Ok(Some(pid)) => Some(pid),
                Ok(None) => spawned(),
                Err(e) => {
                    warn!("Could not look up the FlexLogger process: {e}");
                    spawned()
                }
            }
        });

        lookup.await.unwrap_or_else(|e| {
            warn!("FlexLogger process lookup did not complete: {e}");
            None
        })
    }
}

async fn get_active_project(
    channel: &Channel,
    lifecycle: &Arc<Lifecycle>,
) -> Result<Option<Project>, AutomationError> {
    let response = FlexLoggerApplicationClient::new(channel.clone())
        .get_active_project(GetActiveProjectRequest {})
        .await
        .map_err(|status| {
            rpc_failure(lifecycle.as_ref(), "Failed to get the active project", &status)
        })?
        .into_inner();

    if !response.active_project_available {
        return Ok(None);
    }

    Ok(Some(Project::new(
        channel.clone(),
        Arc::clone(lifecycle) as Arc<dyn ConnectionGuard>,
        response.project.unwrap_or_default(),
    )))
}

impl Drop for Application {
    fn drop(&mut self) {
        if self.channel.is_some() {
            warn!(
                "Application on port {} dropped without close() or disconnect(); FlexLogger is left running",
                self.server_port
            );
        }
    }
}
