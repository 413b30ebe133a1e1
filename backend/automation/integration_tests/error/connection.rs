use flexlogger_automation::AutomationError;
use flexlogger_automation::error::connection::ConnectionError;

use tonic::{Code, Status};

/// **VALUE**: Verifies error messages carry the file/line/column where they were raised.
///
/// **WHY THIS MATTERS**: A failed close in a long automation script is only debuggable if
/// the message says where in the SDK it failed.
///
/// **BUG THIS CATCHES**: Would catch removing `#[track_caller]` from the constructors, which
/// makes every location point into the constructor itself.
#[test]
fn given_already_closed_error_when_formatted_then_includes_caller_location() {
    // GIVEN: An already-closed error raised here
    let err = ConnectionError::already_closed();

    // WHEN: Formatting
    let text = err.to_string();

    // THEN: The location names this test file
    assert!(text.contains("Already Closed Error"), "{text}");
    assert!(text.contains("connection.rs:"), "{text}");
}

#[test]
fn given_untagged_status_when_wrapped_then_message_has_details_and_code_zero() {
    // GIVEN: A transport failure without host tags
    let status = Status::new(Code::Unavailable, "tcp connect error");

    // WHEN: Wrapping
    let err: AutomationError = ConnectionError::from_status("Failed to disconnect", &status).into();

    // THEN: Summary plus details, no host code
    assert_eq!(err.error_code(), 0);
    assert!(
        err.to_string()
            .contains("Failed to disconnect. Additional error details: tcp connect error")
    );
}

#[test]
fn given_empty_status_message_when_wrapped_then_summary_only() {
    // GIVEN: A status with no message
    let status = Status::new(Code::Internal, "");

    // WHEN: Wrapping
    let err = ConnectionError::from_status("Failed to close project", &status);

    // THEN: No details suffix
    match err {
        ConnectionError::Rpc { message, .. } => assert_eq!(message, "Failed to close project"),
        other => panic!("Expected Rpc, got {other:?}"),
    }
}
