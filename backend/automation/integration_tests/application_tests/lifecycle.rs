use crate::application_tests::helpers::{
    ExitingProcessTable, TEST_VERSION, TEST_VERSION_STRING, start_mock_host,
};

use flexlogger_automation::error::connection::ConnectionError;
use flexlogger_automation::{Application, AutomationError, ConnectionState, ExitPolicy};

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tempfile::TempDir;
use tonic::{Code, Status};

/// **VALUE**: Verifies attaching to an impossible port fails before any channel exists.
///
/// **WHY THIS MATTERS**: A stale or corrupt port file yields values like -1; the caller
/// must get a clear connection error, not a hang on an unreachable address.
#[tokio::test]
async fn given_negative_port_when_attached_then_invalid_port_error() {
    // GIVEN / WHEN: Attaching to port -1
    let result = Application::attach(-1).await;

    // THEN: Connection error naming the port
    match result {
        Err(AutomationError::Connection(ConnectionError::InvalidPort { port, message, .. })) => {
            assert_eq!(port, -1);
            assert!(message.contains("invalid port number -1"));
        }
        Err(other) => panic!("Expected InvalidPort, got {other:?}"),
        Ok(_) => panic!("Expected InvalidPort, got a connection"),
    }
}

#[tokio::test]
async fn given_out_of_range_ports_when_attached_then_rejected() {
    // GIVEN / WHEN / THEN: 0 and 65536 are rejected the same way
    for port in [0, 65_536] {
        let result = Application::attach(port).await;
        assert!(
            matches!(
                result,
                Err(AutomationError::Connection(ConnectionError::InvalidPort { .. }))
            ),
            "port {port} should be rejected"
        );
    }
}

/// **VALUE**: Verifies an attached application talks to the server and is not treated as
/// launched by us.
#[tokio::test]
async fn given_running_host_when_attached_then_calls_reach_server() {
    // GIVEN: A running mock host
    let (port, state, _handle) = start_mock_host().await;

    // WHEN: Attaching and asking for the version
    let mut application = Application::attach(i32::from(port)).await.unwrap();
    let version = application.get_version().await.unwrap();

    // THEN: The host answered and the application is attached, not launched
    assert_eq!(version, (TEST_VERSION.to_string(), TEST_VERSION_STRING.to_string()));
    assert!(!application.launched());
    assert_eq!(application.host_pid(), None);
    assert_eq!(application.endpoint(), format!("http://localhost:{port}"));
    assert_eq!(state.calls(), vec!["GetVersion"]);

    application.disconnect().await.unwrap();
}

/// **VALUE**: Verifies a second `close()` fails with AlreadyClosed and sends nothing.
///
/// **WHY THIS MATTERS**: Cleanup code commonly closes in both a `finally`-style path and a
/// normal path; the second call must neither exit a FlexLogger someone else started nor
/// hang on a released channel.
///
/// **BUG THIS CATCHES**: Would catch a second Disconnect RPC reaching the server.
#[tokio::test]
async fn given_closed_application_when_closed_again_then_already_closed_without_rpc() {
    // GIVEN: An attached application that was closed
    let (port, state, _handle) = start_mock_host().await;
    let mut application = Application::attach(i32::from(port)).await.unwrap();
    application.close().await.unwrap();
    assert_eq!(application.state(), ConnectionState::Closed);

    // WHEN: Closing again
    let result = application.close().await;

    // THEN: AlreadyClosed, and only one Disconnect on the wire
    assert!(result.unwrap_err().is_already_closed());
    assert_eq!(state.count("Disconnect"), 1);
}

/// **VALUE**: Verifies the default exit policy leaves an attached FlexLogger running.
///
/// **BUG THIS CATCHES**: Would catch `close()` on an attached instance asking FlexLogger to
/// exit, which kills a user's interactive session.
#[tokio::test]
async fn given_attached_with_default_policy_when_closed_then_disconnects_without_exit() {
    // GIVEN: An attached application with an open project
    let (port, state, _handle) = start_mock_host().await;
    state.set_active_project(Some("user-project"));
    let mut application = Application::attach(i32::from(port)).await.unwrap();

    // WHEN: Closing
    application.close().await.unwrap();

    // THEN: Plain disconnect, the user's project untouched
    assert_eq!(state.calls(), vec!["Disconnect(exit_application=false)"]);
}

/// **VALUE**: Verifies the exiting close sequence: close the active project without
/// prompts, request exit, then wait for the process to go away.
///
/// **WHY THIS MATTERS**: Exiting with an unsaved project open shows a save prompt that
/// blocks the shutdown; the project must be closed first.
#[tokio::test]
async fn given_always_policy_and_open_project_when_closed_then_project_closed_before_exit() {
    // GIVEN: An attached application set to always exit, with a host that leaves after two checks
    let (port, state, _handle) = start_mock_host().await;
    state.set_active_project(Some("project-7"));
    let processes = Arc::new(ExitingProcessTable::new(9001, 2));
    let mut application = Application::attach_with(i32::from(port), processes.clone())
        .await
        .unwrap()
        .with_exit_policy(ExitPolicy::Always);

    // WHEN: Closing
    application.close().await.unwrap();

    // THEN: Project closed without prompts, then exit requested, then the process was followed
    assert_eq!(
        state.calls(),
        vec![
            "GetActiveProject",
            "CloseProject(project-7, allow_prompts=false)",
            "Disconnect(exit_application=true)",
        ]
    );
    assert_eq!(processes.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(processes.checks.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn given_always_policy_and_no_project_when_closed_then_exit_requested() {
    // GIVEN: Always-exit policy, nothing open
    let (port, state, _handle) = start_mock_host().await;
    let processes = Arc::new(ExitingProcessTable::new(9001, 0));
    let mut application = Application::attach_with(i32::from(port), processes)
        .await
        .unwrap()
        .with_exit_policy(ExitPolicy::Always);

    // WHEN: Closing
    application.close().await.unwrap();

    // THEN: No project close, exit requested
    assert_eq!(
        state.calls(),
        vec!["GetActiveProject", "Disconnect(exit_application=true)"]
    );
}

/// **VALUE**: Verifies `disconnect()` never asks FlexLogger to exit, whatever the policy.
#[tokio::test]
async fn given_always_policy_when_disconnected_then_no_exit_and_no_wait() {
    // GIVEN: Always-exit policy and an open project
    let (port, state, _handle) = start_mock_host().await;
    state.set_active_project(Some("project-7"));
    let processes = Arc::new(ExitingProcessTable::new(9001, usize::MAX));
    let mut application = Application::attach_with(i32::from(port), processes.clone())
        .await
        .unwrap()
        .with_exit_policy(ExitPolicy::Always);

    // WHEN: Disconnecting
    application.disconnect().await.unwrap();

    // THEN: Only the disconnect, no process lookup
    assert_eq!(state.calls(), vec!["Disconnect(exit_application=false)"]);
    assert_eq!(processes.lookups.load(Ordering::SeqCst), 0);
    assert!(application.get_version().await.unwrap_err().is_already_closed());
}

/// **VALUE**: Verifies host diagnostics embedded in a failed call surface as code and text.
///
/// **BUG THIS CATCHES**: Would catch losing the host error code, which callers use to tell
/// failures apart, or leaking the raw `[code]` tag into the message.
#[tokio::test]
async fn given_host_reports_error_when_called_then_code_and_details_wrapped() {
    // GIVEN: A host whose version call fails with tagged details
    let (port, state, _handle) = start_mock_host().await;
    state.fail_version_with(Status::new(
        Code::Internal,
        "[-371] The automation server is busy.",
    ));
    let mut application = Application::attach(i32::from(port)).await.unwrap();

    // WHEN: Calling
    let err = application.get_version().await.unwrap_err();

    // THEN: Code extracted, details appended to the summary
    assert_eq!(err.error_code(), -371);
    match &err {
        AutomationError::Connection(ConnectionError::Rpc { message, code, .. }) => {
            assert_eq!(*code, Code::Internal);
            assert_eq!(
                message,
                "Failed to get version. Additional error details: The automation server is busy."
            );
        }
        other => panic!("Expected Rpc error, got {other:?}"),
    }

    application.disconnect().await.unwrap();
}

/// **VALUE**: Verifies `connect` finds a running instance through its port file.
#[tokio::test]
async fn given_port_file_when_connected_then_attached_to_that_port() {
    // GIVEN: A port file naming the mock host
    let (port, state, _handle) = start_mock_host().await;
    let dir = TempDir::new().unwrap();
    let port_file = dir.path().join("LastAutomationPort.txt");
    std::fs::write(&port_file, format!("{port}\n")).unwrap();

    // WHEN: Connecting through it
    let mut application = Application::connect_with_port_file(&port_file).await.unwrap();

    // THEN: Attached to the published port
    assert_eq!(application.server_port(), port);
    application.get_version().await.unwrap();
    application.disconnect().await.unwrap();
    assert_eq!(state.calls(), vec!["GetVersion", "Disconnect(exit_application=false)"]);
}

#[tokio::test]
async fn given_missing_port_file_when_connected_then_not_running() {
    // GIVEN: No port file
    let dir = TempDir::new().unwrap();

    // WHEN: Connecting
    let result = Application::connect_with_port_file(&dir.path().join("missing.txt")).await;

    // THEN: Discovery error
    assert!(matches!(result, Err(AutomationError::Discovery(_))));
}
