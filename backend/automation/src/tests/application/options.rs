use crate::application::options::{DEFAULT_LAUNCH_TIMEOUT, LaunchOptions};
use crate::config::LaunchSettings;
use crate::error::validation::ValidationError;

use std::path::{Path, PathBuf};
use std::time::Duration;

#[test]
fn given_defaults_when_built_then_forty_seconds_no_path_no_prototype() {
    // GIVEN / WHEN: Default options
    let options = LaunchOptions::builder().build().unwrap();

    // THEN: Matches the documented defaults
    assert_eq!(options, LaunchOptions::default());
    assert_eq!(options.timeout(), Duration::from_secs(40));
    assert_eq!(options.executable_path(), None);
    assert!(!options.allow_prototype());
}

/// **VALUE**: Verifies a zero timeout is rejected when the options are built.
///
/// **BUG THIS CATCHES**: Would catch a zero timeout slipping through, which makes every
/// launch fail with a timeout before FlexLogger had a chance to start.
#[test]
fn given_zero_timeout_when_built_then_validation_error() {
    // GIVEN: A builder with a zero timeout
    let builder = LaunchOptions::builder().with_timeout(Duration::ZERO);

    // WHEN: Building
    let result = builder.build();

    // THEN: Validation error
    match result {
        Err(ValidationError::Invalid { message, .. }) => {
            assert!(message.contains("timeout"));
        }
        other => panic!("Expected validation error, got {other:?}"),
    }
}

#[test]
fn given_empty_path_when_built_then_validation_error() {
    // GIVEN / WHEN: An empty explicit path
    let result = LaunchOptions::builder().with_path("").build();

    // THEN: Validation error
    assert!(matches!(result, Err(ValidationError::Invalid { .. })));
}

/// **VALUE**: Verifies the configuration file's launch section maps onto launch options.
///
/// **BUG THIS CATCHES**: Would catch dropping the configured path or prototype flag, so
/// configured launches silently start the registry default without prototypes.
#[test]
fn given_launch_settings_when_converted_then_options_mirror_them() {
    // GIVEN: Launch settings from a config file
    let settings = LaunchSettings {
        timeout_secs: 90,
        executable_path: Some(PathBuf::from("D:/FlexLogger")),
        allow_prototype: true,
    };

    // WHEN: Converting
    let options = LaunchOptions::from_config(&settings).unwrap();

    // THEN: Every field carried over
    assert_eq!(options.timeout(), Duration::from_secs(90));
    assert_eq!(options.executable_path(), Some(Path::new("D:/FlexLogger")));
    assert!(options.allow_prototype());
}

#[test]
fn given_default_settings_when_converted_then_default_timeout() {
    // GIVEN / WHEN: Default settings
    let options = LaunchOptions::from_config(&LaunchSettings::default()).unwrap();

    // THEN: Default timeout
    assert_eq!(options.timeout(), DEFAULT_LAUNCH_TIMEOUT);
}
