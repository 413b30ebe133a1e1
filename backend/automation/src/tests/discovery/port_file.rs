use crate::discovery::port_file::{default_port_file_path, read_port_file};
use crate::error::discovery::DiscoveryError;

use std::error::Error;
use std::path::PathBuf;

use serial_test::serial;
use tempfile::TempDir;

/// **VALUE**: Verifies a running instance's port is read from the port file, ignoring
/// surrounding whitespace.
///
/// **WHY THIS MATTERS**: FlexLogger writes the file with a trailing newline; a strict
/// parse would make `connect()` always fail.
#[test]
fn given_port_file_with_newline_when_read_then_returns_port() {
    // GIVEN: A port file as FlexLogger writes it
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("LastAutomationPort.txt");
    std::fs::write(&path, "50123\r\n").unwrap();

    // WHEN: Reading it
    let port = read_port_file(&path).unwrap();

    // THEN: The trimmed integer is returned
    assert_eq!(port, 50123);
}

/// **VALUE**: Verifies a missing port file reports that FlexLogger is not running.
///
/// **BUG THIS CATCHES**: Would catch surfacing a raw io "file not found" error instead of
/// the hint about enabling the automation server.
#[test]
fn given_missing_port_file_when_read_then_not_running_without_cause() {
    // GIVEN: A path that does not exist
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("LastAutomationPort.txt");

    // WHEN: Reading it
    let result = read_port_file(&path);

    // THEN: NotRunning, mentioning the automation server preference
    match result {
        Err(err @ DiscoveryError::NotRunning { .. }) => {
            assert!(err.to_string().contains("automation server is not enabled"));
            assert!(err.source().is_none());
        }
        other => panic!("Expected NotRunning, got {other:?}"),
    }
}

#[test]
fn given_garbage_port_file_when_read_then_not_running_with_cause() {
    // GIVEN: A port file that does not hold an integer
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("LastAutomationPort.txt");
    std::fs::write(&path, "not-a-port").unwrap();

    // WHEN: Reading it
    let result = read_port_file(&path);

    // THEN: NotRunning, with the parse failure as the source
    match result {
        Err(err @ DiscoveryError::NotRunning { .. }) => {
            assert!(err.source().is_some(), "parse error should be chained");
        }
        other => panic!("Expected NotRunning, got {other:?}"),
    }
}

/// **VALUE**: Verifies the default port file lives under the ProgramData directory.
///
/// **WHY THIS MATTERS**: FlexLogger writes the file machine-wide; looking in a per-user
/// folder would never find it.
#[test]
#[serial]
fn given_program_data_env_when_default_path_built_then_under_program_data() {
    // GIVEN: A ProgramData override
    let dir = TempDir::new().unwrap();
    let previous = std::env::var_os("ProgramData");
    // SAFETY: serialized with the other environment-mutating tests.
    unsafe { std::env::set_var("ProgramData", dir.path()) };

    // WHEN: Building the default path
    let path = default_port_file_path();

    // THEN: National Instruments/FlexLogger/LastAutomationPort.txt under it
    let expected: PathBuf = dir
        .path()
        .join("National Instruments")
        .join("FlexLogger")
        .join("LastAutomationPort.txt");
    assert_eq!(path, expected);

    match previous {
        // SAFETY: as above.
        Some(value) => unsafe { std::env::set_var("ProgramData", value) },
        None => unsafe { std::env::remove_var("ProgramData") },
    }
}
