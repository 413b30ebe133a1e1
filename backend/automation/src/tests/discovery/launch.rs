use crate::application::options::LaunchOptions;
use crate::discovery::launch::{
    DiscoveryToken, LAUNCH_POLL_INTERVAL, build_launch_command, launch_host, wait_for_ready,
};
use crate::discovery::rendezvous::Rendezvous;
use crate::error::launch::LaunchError;
use crate::tests::fakes::{
    CallLog, EventBehavior, FakeRegistry, FakeRendezvous, RecordingLauncher, platform,
};

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

/// **VALUE**: Verifies FlexLogger is started with the rendezvous names and the automation
/// server switch.
///
/// **WHY THIS MATTERS**: FlexLogger only publishes its port when it is told which event to
/// signal and which mapping to write; a typo in a flag makes every launch time out.
#[test]
fn given_token_when_command_built_then_passes_rendezvous_flags_in_order() {
    // GIVEN: A fixed token
    let token = DiscoveryToken {
        event_name: "evt".to_string(),
        mapped_file_name: "map".to_string(),
    };

    // WHEN: Building the command without prototype support
    let command = build_launch_command(Path::new("C:/FL/FlexLogger.exe"), &token, false);

    // THEN: Exactly the three rendezvous arguments
    assert_eq!(
        command.args,
        vec![
            "-mappedFileIsReadyEventName=evt",
            "-mappedFileName=map",
            "-enableAutomationServer",
        ]
    );
    assert_eq!(command.program, Path::new("C:/FL/FlexLogger.exe"));
}

#[test]
fn given_allow_prototype_when_command_built_then_flag_appended() {
    // GIVEN: A token
    let token = DiscoveryToken::generate();

    // WHEN: Building the command with prototype support
    let command = build_launch_command(Path::new("FlexLogger.exe"), &token, true);

    // THEN: -allowPrototype comes last
    assert_eq!(command.args.last().map(String::as_str), Some("-allowPrototype"));
    assert_eq!(command.args.len(), 4);
}

/// **VALUE**: Verifies every launch attempt gets fresh, distinct rendezvous names.
///
/// **BUG THIS CATCHES**: Would catch reusing a name between attempts, which lets a stale
/// event from an earlier launch report a port for the wrong process.
#[test]
fn given_many_tokens_when_generated_then_all_names_unique_hex() {
    // GIVEN / WHEN: Many generated tokens
    let tokens: Vec<_> = (0..64).map(|_| DiscoveryToken::generate()).collect();

    // THEN: No name repeats, and names are 32 hex digits without hyphens
    let mut seen = HashSet::new();
    for token in &tokens {
        assert_ne!(token.event_name, token.mapped_file_name);
        assert!(seen.insert(token.event_name.clone()));
        assert!(seen.insert(token.mapped_file_name.clone()));
        assert_eq!(token.event_name.len(), 32);
        assert!(token.event_name.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

/// **VALUE**: Verifies the launch timeout fires no earlier than the timeout and no later
/// than one poll interval after it.
///
/// **WHY THIS MATTERS**: Callers size their own deadlines around the launch timeout; a
/// wait that overshoots by seconds stalls scripts, one that fires early fails slow machines.
#[tokio::test(start_paused = true)]
async fn given_event_never_signals_when_waiting_then_times_out_within_one_slice() {
    // GIVEN: An event that never signals
    let log = CallLog::default();
    let rendezvous = FakeRendezvous::new(EventBehavior::Never, 0, &log);
    let event = rendezvous.create_ready_event("evt").unwrap();
    let timeout = Duration::from_millis(1_050);

    // WHEN: Waiting
    let start = Instant::now();
    let result = wait_for_ready(event.as_ref(), timeout).await;
    let elapsed = start.elapsed();

    // THEN: LaunchTimeout within [T, T + one slice]
    assert!(matches!(result, Err(LaunchError::Timeout { .. })));
    assert!(elapsed >= timeout, "fired early: {elapsed:?}");
    assert!(elapsed <= timeout + LAUNCH_POLL_INTERVAL, "fired late: {elapsed:?}");
}

/// **VALUE**: Verifies the event is polled in slices rather than waited on once.
///
/// **BUG THIS CATCHES**: Would catch a single blocking wait for the full timeout, which
/// makes the launch impossible to cancel.
#[tokio::test(start_paused = true)]
async fn given_event_signals_after_delay_when_waiting_then_returns_after_several_polls() {
    // GIVEN: An event that signals after 1 s
    let log = CallLog::default();
    let rendezvous = FakeRendezvous::new(EventBehavior::SignalAfter(Duration::from_secs(1)), 0, &log);
    let polls = Arc::clone(&rendezvous.polls);
    let event = rendezvous.create_ready_event("evt").unwrap();

    // WHEN: Waiting with a generous timeout
    let start = Instant::now();
    wait_for_ready(event.as_ref(), Duration::from_secs(40)).await.unwrap();

    // THEN: Returned at the first poll after the signal
    assert!(start.elapsed() <= Duration::from_secs(1) + LAUNCH_POLL_INTERVAL);
    assert!(polls.load(Ordering::SeqCst) >= 5);
}

/// **VALUE**: Verifies a timeout too large for a deadline waits instead of panicking.
///
/// **BUG THIS CATCHES**: Would catch computing the deadline with `Instant + Duration`,
/// which overflows and panics for `Duration::MAX`.
#[tokio::test(start_paused = true)]
async fn given_unbounded_timeout_when_waiting_then_returns_once_signaled() {
    // GIVEN: An event that signals after 3 s, and a timeout no deadline can hold
    let log = CallLog::default();
    let rendezvous = FakeRendezvous::new(EventBehavior::SignalAfter(Duration::from_secs(3)), 0, &log);
    let event = rendezvous.create_ready_event("evt").unwrap();

    // WHEN: Waiting
    let start = Instant::now();
    let result = wait_for_ready(event.as_ref(), Duration::MAX).await;

    // THEN: Ready at the first poll after the signal
    assert!(result.is_ok(), "{result:?}");
    assert!(start.elapsed() <= Duration::from_secs(3) + LAUNCH_POLL_INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn given_unbounded_timeout_when_launching_then_host_port_reported() {
    // GIVEN: Options built with the largest timeout
    let log = CallLog::default();
    let platform = platform(
        FakeRegistry::installed(&["2024.1"], "C:/FL", &log),
        FakeRendezvous::new(EventBehavior::SignalAfter(Duration::from_millis(400)), 5005, &log),
        RecordingLauncher::new(Some(7), &log),
    );
    let options = LaunchOptions::builder()
        .with_timeout(Duration::MAX)
        .build()
        .unwrap();

    // WHEN: Launching
    let host = launch_host(&options, &platform).await.unwrap();

    // THEN: The published port comes back
    assert_eq!(host.port, 5005);
}

#[tokio::test(start_paused = true)]
async fn given_wait_failure_when_waiting_then_launch_error_carries_code() {
    // GIVEN: An event whose wait fails with an OS error code
    let log = CallLog::default();
    let rendezvous = FakeRendezvous::new(EventBehavior::FailWith(87), 0, &log);
    let event = rendezvous.create_ready_event("evt").unwrap();

    // WHEN: Waiting
    let result = wait_for_ready(event.as_ref(), Duration::from_secs(40)).await;

    // THEN: Launch error with the code, reported immediately
    match result {
        Err(err @ LaunchError::Wait { code: 87, .. }) => {
            assert!(err.to_string().contains("error code 87"));
        }
        other => panic!("Expected Wait error, got {other:?}"),
    }
}

/// **VALUE**: Verifies the ready event exists before FlexLogger starts and is released
/// only after the port was read.
///
/// **WHY THIS MATTERS**: FlexLogger opens the event by name at startup; if it does not exist
/// yet, the signal is lost and the launch times out.
#[tokio::test(start_paused = true)]
async fn given_successful_launch_when_launching_then_event_brackets_spawn_and_read() {
    // GIVEN: A host that signals after 300 ms with port 5005
    let log = CallLog::default();
    let rendezvous =
        FakeRendezvous::new(EventBehavior::SignalAfter(Duration::from_millis(300)), 5005, &log);
    let names = Arc::clone(&rendezvous.names);
    let launcher = RecordingLauncher::new(Some(4242), &log);
    let commands = Arc::clone(&launcher.commands);
    let platform = platform(FakeRegistry::installed(&["2024.1"], "C:/FL", &log), rendezvous, launcher);

    // WHEN: Launching
    let host = launch_host(&LaunchOptions::default(), &platform).await.unwrap();

    // THEN: create < spawn < read_port < release
    let create = log.position("event.create").unwrap();
    let spawn = log.position("launcher.spawn").unwrap();
    let read = log.position("mapping.read_port").unwrap();
    let release = log.position("event.release").unwrap();
    assert!(create < spawn && spawn < read && read < release, "{:?}", log.calls());

    // THEN: The port and PID are reported, and the command names the token used
    assert_eq!(host.port, 5005);
    assert_eq!(host.pid, Some(4242));
    let names = names.lock().unwrap();
    let command = commands.lock().unwrap()[0].clone();
    assert!(command.args.contains(&format!("-mappedFileIsReadyEventName={}", names[0])));
    assert!(command.args.contains(&format!("-mappedFileName={}", names[1])));
}

/// **VALUE**: Verifies the ready event is released when the launch times out.
///
/// **BUG THIS CATCHES**: Would catch leaking the named event handle on the error path,
/// which the next attempt would never reuse but the OS keeps alive.
#[tokio::test(start_paused = true)]
async fn given_launch_timeout_when_launching_then_event_still_released() {
    // GIVEN: A host that never signals
    let log = CallLog::default();
    let platform = platform(
        FakeRegistry::installed(&["2024.1"], "C:/FL", &log),
        FakeRendezvous::new(EventBehavior::Never, 0, &log),
        RecordingLauncher::new(Some(1), &log),
    );
    let options = LaunchOptions::builder()
        .with_timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    // WHEN: Launching
    let result = launch_host(&options, &platform).await;

    // THEN: Timeout, event released, port never read
    assert!(matches!(result, Err(LaunchError::Timeout { .. })));
    assert!(log.contains("event.release"));
    assert!(!log.contains("mapping.read_port"));
}

#[tokio::test(start_paused = true)]
async fn given_spawn_failure_when_launching_then_event_released_and_error_returned() {
    // GIVEN: A launcher that cannot start the executable
    let log = CallLog::default();
    let mut launcher = RecordingLauncher::new(None, &log);
    launcher.fail = true;
    let platform = platform(
        FakeRegistry::installed(&["2024.1"], "C:/FL", &log),
        FakeRendezvous::new(EventBehavior::Never, 0, &log),
        launcher,
    );

    // WHEN: Launching
    let result = launch_host(&LaunchOptions::default(), &platform).await;

    // THEN: Spawn error and the event was released
    assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    assert!(log.contains("event.release"));
}

/// **VALUE**: Verifies nothing is created or spawned when no executable can be found.
///
/// **WHY THIS MATTERS**: On a machine without FlexLogger the failure must be a clear
/// resolution error, not a spawn error for an empty path.
#[tokio::test(start_paused = true)]
async fn given_unresolvable_executable_when_launching_then_no_event_and_no_spawn() {
    // GIVEN: No registry entry and no explicit path
    let log = CallLog::default();
    let platform = platform(
        FakeRegistry::missing(&log),
        FakeRendezvous::new(EventBehavior::Never, 0, &log),
        RecordingLauncher::new(None, &log),
    );

    // WHEN: Launching
    let result = launch_host(&LaunchOptions::default(), &platform).await;

    // THEN: Resolution error before any launch side effect
    assert!(matches!(result, Err(LaunchError::Resolution { .. })));
    assert!(!log.contains("event.create"));
    assert!(!log.contains("launcher.spawn"));
}
