use crate::application_tests::helpers::{
    ExitingProcessTable, mock_host_platform, start_mock_host,
};

use flexlogger_automation::config::AutomationConfig;
use flexlogger_automation::error::connection::ConnectionError;
use flexlogger_automation::{
    Application, AutomationError, ConnectionState, ExitPolicy, LaunchOptions,
};

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::Instant;
use tonic::{Code, Status};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

/// **VALUE**: Verifies a failing Disconnect still leaves the application closed.
///
/// **WHY THIS MATTERS**: The caller cannot retry a half-finished shutdown; whatever the
/// server said, the channel is gone and every later call must fail the same way.
///
/// **BUG THIS CATCHES**: Would catch the error path returning early before the channel is
/// released or the state is set, leaving an application that still talks to the host.
#[tokio::test]
async fn given_disconnect_fails_when_disconnecting_then_error_returned_and_closed() {
    // GIVEN: A host whose Disconnect fails with tagged details
    let (port, state, _handle) = start_mock_host().await;
    state.fail_disconnect_with(Status::new(Code::Internal, "[-250] Shutdown refused."));
    let mut application = Application::attach(i32::from(port)).await.unwrap();

    // WHEN: Disconnecting
    let err = application.disconnect().await.unwrap_err();

    // THEN: The wrapped host error is returned
    assert_eq!(err.error_code(), -250);
    assert!(matches!(
        err,
        AutomationError::Connection(ConnectionError::Rpc { .. })
    ));

    // THEN: Closed, and later calls are rejected without reaching the host
    assert_eq!(application.state(), ConnectionState::Closed);
    assert!(application.get_version().await.unwrap_err().is_already_closed());
    assert!(application.close().await.unwrap_err().is_already_closed());
    assert_eq!(state.calls(), vec!["Disconnect(exit_application=false)"]);
}

/// **VALUE**: Verifies a failing project close during an exiting `close()` surfaces the
/// error and still closes the application.
///
/// **BUG THIS CATCHES**: Would catch the `?` on the project close skipping the state
/// change, so a second `close()` would send another round of RPCs.
#[tokio::test]
async fn given_project_close_fails_when_closing_then_error_returned_and_closed() {
    // GIVEN: Always-exit policy and an open project the host refuses to close
    let (port, state, _handle) = start_mock_host().await;
    state.set_active_project(Some("project-9"));
    state.fail_close_with(Status::new(Code::FailedPrecondition, "[-12] Project is busy."));
    let processes = Arc::new(ExitingProcessTable::new(9001, 0));
    let mut application = Application::attach_with(i32::from(port), processes)
        .await
        .unwrap()
        .with_exit_policy(ExitPolicy::Always);

    // WHEN: Closing
    let err = application.close().await.unwrap_err();

    // THEN: The project close error, with the host's details
    assert_eq!(err.error_code(), -12);
    assert!(err.to_string().contains("Failed to close project"), "{err}");

    // THEN: Closed and inert; the exit was not requested after the failure
    assert_eq!(application.state(), ConnectionState::Closed);
    assert!(application.close().await.unwrap_err().is_already_closed());
    assert_eq!(
        state.calls(),
        vec![
            "GetActiveProject",
            "CloseProject(project-9, allow_prompts=false)",
        ]
    );
}

/// **VALUE**: Verifies closing a launched FlexLogger that never exits still completes.
///
/// **WHY THIS MATTERS**: A host stuck on a modal dialog must not turn `close()` into an
/// error or a hang; the wait gives up after 60 s and the application is closed anyway.
///
/// **BUG THIS CATCHES**: Would catch the expired exit wait being reported as a failure,
/// or the default policy not asking a launched FlexLogger to exit.
#[tokio::test(start_paused = true)]
async fn given_launched_host_never_exits_when_closed_then_ok_after_close_timeout() {
    // GIVEN: A FlexLogger launched by this connection that stays alive
    let (port, state, _handle) = start_mock_host().await;
    let processes = Arc::new(ExitingProcessTable::new(4242, usize::MAX));
    let platform = mock_host_platform(port, 4242, processes.clone());
    let mut application = Application::launch_with(LaunchOptions::default(), &platform)
        .await
        .unwrap();
    assert!(application.launched());
    assert_eq!(application.exit_policy(), ExitPolicy::LaunchedOnly);

    // WHEN: Closing
    let start = Instant::now();
    let result = application.close().await;
    let elapsed = start.elapsed();

    // THEN: Ok, after the full exit wait, with exit requested
    assert!(result.is_ok(), "{result:?}");
    assert!(elapsed >= CLOSE_TIMEOUT - Duration::from_millis(200), "{elapsed:?}");
    assert_eq!(application.state(), ConnectionState::Closed);
    assert_eq!(
        state.calls(),
        vec!["GetActiveProject", "Disconnect(exit_application=true)"]
    );
    assert!(processes.checks.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn given_launched_host_exits_when_closed_then_returns_without_full_wait() {
    // GIVEN: A launched FlexLogger that exits right after Disconnect
    let (port, state, _handle) = start_mock_host().await;
    let processes = Arc::new(ExitingProcessTable::new(4242, 1));
    let platform = mock_host_platform(port, 4242, processes.clone());
    let mut application = Application::launch_with(LaunchOptions::default(), &platform)
        .await
        .unwrap();

    // WHEN: Closing
    application.close().await.unwrap();

    // THEN: Exit requested and the process followed until it was gone
    assert_eq!(state.count("Disconnect(exit_application=true)"), 1);
    assert_eq!(processes.checks.load(Ordering::SeqCst), 2);
    assert_eq!(application.host_pid(), Some(4242));
}

/// **VALUE**: Verifies the configuration file's connection section is honoured.
///
/// **BUG THIS CATCHES**: Would catch `connect_with_config` ignoring the configured port
/// file or exit policy, so an attached FlexLogger set to "always exit" is left running.
#[tokio::test]
async fn given_config_with_port_file_and_always_policy_when_connected_then_both_applied() {
    // GIVEN: A config naming a port file for the mock host and the always-exit policy
    let (port, state, _handle) = start_mock_host().await;
    let dir = TempDir::new().unwrap();
    let port_file = dir.path().join("port.txt");
    std::fs::write(&port_file, port.to_string()).unwrap();

    let mut config = AutomationConfig::default();
    config.connection.port_file = Some(port_file);
    config.connection.exit_policy = ExitPolicy::Always;

    // WHEN: Connecting through the config and closing
    let mut application = Application::connect_with_config(&config).await.unwrap();
    assert_eq!(application.server_port(), port);
    assert_eq!(application.exit_policy(), ExitPolicy::Always);
    application.close().await.unwrap();

    // THEN: The attached host was asked to exit
    assert_eq!(
        state.calls(),
        vec!["GetActiveProject", "Disconnect(exit_application=true)"]
    );
}
