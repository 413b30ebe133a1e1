use crate::application_tests::helpers::{TEST_PROJECT_ID, start_mock_host};

use flexlogger_automation::{Application, ConnectionGuard};

/// **VALUE**: Verifies a project handed out before `disconnect()` refuses to reach the host
/// afterwards.
///
/// **WHY THIS MATTERS**: Project objects outlive the application in user code; after the
/// channel is released their calls must fail fast instead of hanging or erroring at the
/// transport layer.
///
/// **BUG THIS CATCHES**: Would catch wrappers skipping the guard and sending RPCs on a
/// disconnected connection.
#[tokio::test]
async fn given_disconnected_application_when_project_closed_then_already_closed_without_rpc() {
    // GIVEN: A project obtained from an attached application
    let (port, state, _handle) = start_mock_host().await;
    state.set_active_project(Some(TEST_PROJECT_ID));
    let mut application = Application::attach(i32::from(port)).await.unwrap();
    let project = application.get_active_project().await.unwrap().unwrap();

    // WHEN: The application disconnects, then the project is closed
    application.disconnect().await.unwrap();
    let result = project.close().await;

    // THEN: AlreadyClosed, and the host never saw a CloseProject
    assert!(result.unwrap_err().is_already_closed());
    assert_eq!(state.count("CloseProject"), 0);
}

#[tokio::test]
async fn given_open_project_when_closed_then_host_closes_it_without_prompts() {
    // GIVEN: A project opened through the application
    let (port, state, _handle) = start_mock_host().await;
    let mut application = Application::attach(i32::from(port)).await.unwrap();
    let project = application
        .open_project(r"C:\Projects\Bench.flxproj")
        .await
        .unwrap();
    assert_eq!(project.identifier().id, TEST_PROJECT_ID);

    // WHEN: Closing the project
    project.close().await.unwrap();

    // THEN: The host received the open and a prompt-free close
    assert_eq!(
        state.calls(),
        vec![
            r"OpenProject(C:\Projects\Bench.flxproj)".to_string(),
            format!("CloseProject({TEST_PROJECT_ID}, allow_prompts=false)"),
        ]
    );
    assert!(application.get_active_project().await.unwrap().is_none());
    application.disconnect().await.unwrap();
}

/// **VALUE**: Verifies the guard given to wrappers tracks the application's lifecycle.
#[tokio::test]
async fn given_application_guard_when_application_closes_then_guard_raises() {
    // GIVEN: The guard of a connected application
    let (port, _state, _handle) = start_mock_host().await;
    let mut application = Application::attach(i32::from(port)).await.unwrap();
    let guard = application.guard();
    assert!(guard.raise_if_closed().is_ok());

    // WHEN: The application closes
    application.close().await.unwrap();

    // THEN: The guard reports closed
    assert!(guard.raise_if_closed().unwrap_err().is_already_closed());
}
