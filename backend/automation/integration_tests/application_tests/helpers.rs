//! Test helpers for application integration tests.
//!
//! This module provides an in-process automation server standing in for FlexLogger:
//! - Serving the Application, FlexLoggerApplication and Project services on 127.0.0.1
//! - Recording every call in arrival order
//! - Scripted failures for individual calls
//! - Platform stand-ins so `launch_with` can start a "FlexLogger" that is this server

use flexlogger_automation::Platform;
use flexlogger_automation::discovery::launch::{LaunchCommand, ProcessLauncher};
use flexlogger_automation::discovery::process::ProcessTable;
use flexlogger_automation::discovery::registry::InstallRegistry;
use flexlogger_automation::discovery::rendezvous::{ReadyEvent, Rendezvous, WaitOutcome};
use flexlogger_automation::error::discovery::DiscoveryError;
use flexlogger_automation::error::launch::LaunchError;
use flexlogger_automation::proto::ProjectIdentifier;
use flexlogger_automation::proto::diagram_sdk::automation::application_server::{
    Application as ApplicationService, ApplicationServer,
};
use flexlogger_automation::proto::diagram_sdk::automation::{DisconnectRequest, DisconnectResponse};
use flexlogger_automation::proto::flexlogger::automation::flex_logger_application_server::{
    FlexLoggerApplication, FlexLoggerApplicationServer,
};
use flexlogger_automation::proto::flexlogger::automation::project_server::{
    Project as ProjectService, ProjectServer,
};
use flexlogger_automation::proto::flexlogger::automation::{
    CloseProjectRequest, CloseProjectResponse, GetActiveProjectRequest, GetActiveProjectResponse,
    GetVersionRequest, GetVersionResponse, OpenProjectRequest, OpenProjectResponse,
};

use std::io::Result as IoResult;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

pub const TEST_PROJECT_ID: &str = "project-1";
pub const TEST_VERSION: &str = "24.3.0.49152";
pub const TEST_VERSION_STRING: &str = "2024 Q3";

/// Shared state of the mock FlexLogger.
#[derive(Debug, Default)]
pub struct HostState {
    pub calls: Mutex<Vec<String>>,
    pub active_project: Mutex<Option<String>>,
    pub version_failure: Mutex<Option<Status>>,
    pub disconnect_failure: Mutex<Option<Status>>,
    pub close_failure: Mutex<Option<Status>>,
}

impl HostState {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn set_active_project(&self, id: Option<&str>) {
        *self.active_project.lock().unwrap() = id.map(str::to_string);
    }

    pub fn fail_version_with(&self, status: Status) {
        *self.version_failure.lock().unwrap() = Some(status);
    }

    pub fn fail_disconnect_with(&self, status: Status) {
        *self.disconnect_failure.lock().unwrap() = Some(status);
    }

    pub fn fail_close_with(&self, status: Status) {
        *self.close_failure.lock().unwrap() = Some(status);
    }
}

#[derive(Debug, Clone)]
pub struct MockHost(pub Arc<HostState>);

#[tonic::async_trait]
impl ApplicationService for MockHost {
    async fn disconnect(
        &self,
        request: Request<DisconnectRequest>,
    ) -> Result<Response<DisconnectResponse>, Status> {
        let exit = request.into_inner().exit_application;
        self.0.record(format!("Disconnect(exit_application={exit})"));
        if let Some(status) = self.0.disconnect_failure.lock().unwrap().clone() {
            return Err(status);
        }
        Ok(Response::new(DisconnectResponse {}))
    }
}

#[tonic::async_trait]
impl FlexLoggerApplication for MockHost {
    async fn open_project(
        &self,
        request: Request<OpenProjectRequest>,
    ) -> Result<Response<OpenProjectResponse>, Status> {
        let path = request.into_inner().project_path;
        self.0.record(format!("OpenProject({path})"));
        self.0.set_active_project(Some(TEST_PROJECT_ID));
        Ok(Response::new(OpenProjectResponse {
            project: Some(ProjectIdentifier {
                id: TEST_PROJECT_ID.to_string(),
            }),
        }))
    }

    async fn get_active_project(
        &self,
        _request: Request<GetActiveProjectRequest>,
    ) -> Result<Response<GetActiveProjectResponse>, Status> {
        self.0.record("GetActiveProject");
        let active = self.0.active_project.lock().unwrap().clone();
        Ok(Response::new(GetActiveProjectResponse {
            active_project_available: active.is_some(),
            project: active.map(|id| ProjectIdentifier { id }),
        }))
    }

    async fn get_version(
        &self,
        _request: Request<GetVersionRequest>,
    ) -> Result<Response<GetVersionResponse>, Status> {
        self.0.record("GetVersion");
        if let Some(status) = self.0.version_failure.lock().unwrap().clone() {
            return Err(status);
        }
        Ok(Response::new(GetVersionResponse {
            version: TEST_VERSION.to_string(),
            version_string: TEST_VERSION_STRING.to_string(),
        }))
    }
}

#[tonic::async_trait]
impl ProjectService for MockHost {
    async fn close(
        &self,
        request: Request<CloseProjectRequest>,
    ) -> Result<Response<CloseProjectResponse>, Status> {
        let request = request.into_inner();
        let id = request.project.map(|p| p.id).unwrap_or_default();
        self.0
            .record(format!("CloseProject({id}, allow_prompts={})", request.allow_prompts));
        if let Some(status) = self.0.close_failure.lock().unwrap().clone() {
            return Err(status);
        }
        self.0.set_active_project(None);
        Ok(Response::new(CloseProjectResponse {}))
    }
}

/// Test helper: Start the mock automation server on an ephemeral port.
pub async fn start_mock_host() -> (u16, Arc<HostState>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock host");
    let port = listener.local_addr().expect("No local address").port();

    let state = Arc::new(HostState::default());
    let host = MockHost(Arc::clone(&state));

    let handle = tokio::spawn(async move {
        Server::builder()
            .add_service(ApplicationServer::new(host.clone()))
            .add_service(FlexLoggerApplicationServer::new(host.clone()))
            .add_service(ProjectServer::new(host))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("Mock host failed");
    });

    (port, state, handle)
}

/// Process table reporting `pid` as the port owner, gone after `checks_until_exit` checks.
#[derive(Debug)]
pub struct ExitingProcessTable {
    pub pid: u32,
    pub checks_until_exit: usize,
    pub checks: AtomicUsize,
    pub lookups: AtomicUsize,
}

impl ExitingProcessTable {
    pub fn new(pid: u32, checks_until_exit: usize) -> Self {
        Self {
            pid,
            checks_until_exit,
            checks: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }
}

impl ProcessTable for ExitingProcessTable {
    fn find_host_pid(&self, _port: u16) -> Result<Option<u32>, DiscoveryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.pid))
    }

    fn is_host_process(&self, pid: u32) -> bool {
        pid == self.pid && self.checks.fetch_add(1, Ordering::SeqCst) < self.checks_until_exit
    }
}

/// Registry with a single installed version.
#[derive(Debug)]
pub struct InstalledRegistry;

impl InstallRegistry for InstalledRegistry {
    fn version_subkeys(&self) -> IoResult<Vec<String>> {
        Ok(vec!["2024.3".to_string()])
    }

    fn install_directory(&self, _subkey: &str) -> IoResult<PathBuf> {
        Ok(PathBuf::from(r"C:\Program Files\National Instruments\FlexLogger"))
    }
}

struct SignaledEvent;

impl ReadyEvent for SignaledEvent {
    fn poll(&self) -> WaitOutcome {
        WaitOutcome::Signaled
    }
}

/// Rendezvous that is ready at once and publishes the mock host's port.
#[derive(Debug)]
pub struct ReadyRendezvous {
    pub port: u16,
}

impl Rendezvous for ReadyRendezvous {
    fn create_ready_event(&self, _name: &str) -> Result<Box<dyn ReadyEvent>, LaunchError> {
        Ok(Box::new(SignaledEvent))
    }

    fn read_port(&self, _mapped_file_name: &str) -> Result<i32, LaunchError> {
        Ok(i32::from(self.port))
    }
}

/// Launcher that records the command and reports `pid` without starting anything.
#[derive(Debug, Default)]
pub struct StubLauncher {
    pub pid: u32,
    pub commands: Mutex<Vec<LaunchCommand>>,
}

impl ProcessLauncher for StubLauncher {
    fn spawn(&self, command: &LaunchCommand) -> Result<Option<u32>, LaunchError> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(Some(self.pid))
    }
}

/// Test helper: Platform whose launch "starts" the mock host on `port` as `pid`.
pub fn mock_host_platform(port: u16, pid: u32, processes: Arc<dyn ProcessTable>) -> Platform {
    Platform {
        registry: Arc::new(InstalledRegistry),
        rendezvous: Arc::new(ReadyRendezvous { port }),
        launcher: Arc::new(StubLauncher {
            pid,
            commands: Mutex::new(Vec::new()),
        }),
        processes,
    }
}
