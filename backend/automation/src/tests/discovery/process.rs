// Unit tests for process module private functions

use crate::discovery::process::{
    APP_CLOSE_TIMEOUT, EXIT_POLL_INTERVAL, candidate_pids, is_host_executable, wait_for_exit,
    with_process,
};
use crate::tests::fakes::FakeProcessTable;

use std::sync::atomic::Ordering;

use tokio::time::Instant;

/// **VALUE**: Verifies only processes with a socket on the automation port are candidates.
///
/// **WHY THIS MATTERS**: The PID found here is the one `close()` waits on; picking a process
/// on another port waits 60 s for the wrong program.
///
/// **BUG THIS CATCHES**: Would catch matching remote ports, or keeping our own PID, which
/// always holds the client end of the connection.
#[test]
fn given_sockets_on_several_ports_when_filtered_then_only_port_owners_except_self() {
    // GIVEN: Our process and FlexLogger both on port 5005, another process elsewhere
    let own_pid = 100;
    let flexlogger = [200, own_pid];
    let ours = [own_pid];
    let other = [300];
    let sockets: Vec<(u16, &[u32])> = vec![
        (5005, &flexlogger[..]),
        (5005, &ours[..]),
        (6000, &other[..]),
    ];

    // WHEN: Filtering for port 5005
    let pids = candidate_pids(sockets, 5005, own_pid);

    // THEN: Only FlexLogger remains
    assert_eq!(pids.into_iter().collect::<Vec<_>>(), vec![200]);
}

#[test]
fn given_no_socket_on_port_when_filtered_then_empty() {
    // GIVEN: Sockets on unrelated ports
    let pids = [1];
    let sockets: Vec<(u16, &[u32])> = vec![(80, &pids[..])];

    // WHEN / THEN: No candidates
    assert!(candidate_pids(sockets, 5005, 0).is_empty());
}

#[test]
fn given_executable_names_when_compared_then_case_insensitive_exact_match() {
    // GIVEN / WHEN / THEN: Only FlexLogger.exe, in any case
    assert!(is_host_executable("FlexLogger.exe"));
    assert!(is_host_executable("FLEXLOGGER.EXE"));
    assert!(!is_host_executable("FlexLoggerHelper.exe"));
    assert!(!is_host_executable("FlexLogger"));
}

/// **VALUE**: Tests that `with_process()` gracefully handles non-existent PIDs.
///
/// **BUG THIS CATCHES**: Prevents crashes when the host exits between the socket scan
/// and the process lookup.
#[test]
fn given_nonexistent_pid_when_with_process_called_then_returns_none() {
    // GIVEN: A PID that doesn't exist
    let fake_pid = u32::MAX;

    // WHEN: Calling with_process with the invalid PID
    let result = with_process(fake_pid, |_| true);

    // THEN: Should return None (graceful handling)
    assert!(result.is_none(), "Should return None for non-existent process");
}

/// **VALUE**: Verifies an exit wait on a process that never exits gives up after about
/// 60 s instead of hanging.
///
/// **WHY THIS MATTERS**: A FlexLogger stuck on a modal dialog must not block `close()`
/// forever; the wait expiring is tolerated and only logged.
#[tokio::test(start_paused = true)]
async fn given_host_never_exits_when_waiting_then_gives_up_after_close_timeout() {
    // GIVEN: A host process that stays alive
    let processes = FakeProcessTable::never_exits(4242);

    // WHEN: Waiting for it to exit
    let start = Instant::now();
    let exited = wait_for_exit(&processes, 4242).await;
    let elapsed = start.elapsed();

    // THEN: Reports not exited, after roughly the close timeout
    assert!(!exited);
    assert!(elapsed >= APP_CLOSE_TIMEOUT - EXIT_POLL_INTERVAL, "gave up early: {elapsed:?}");
    assert!(elapsed <= APP_CLOSE_TIMEOUT + EXIT_POLL_INTERVAL, "gave up late: {elapsed:?}");
}

/// **VALUE**: Verifies the exit wait returns as soon as the process is gone.
///
/// **BUG THIS CATCHES**: Would catch always sleeping the full timeout, which makes every
/// `close()` of a launched FlexLogger take a minute.
#[tokio::test(start_paused = true)]
async fn given_host_exits_after_three_checks_when_waiting_then_returns_promptly() {
    // GIVEN: A host that is alive for three checks
    let processes = FakeProcessTable::exits_after(4242, 3);

    // WHEN: Waiting
    let start = Instant::now();
    let exited = wait_for_exit(&processes, 4242).await;

    // THEN: Exited after three poll intervals
    assert!(exited);
    let elapsed = start.elapsed();
    assert!(elapsed >= EXIT_POLL_INTERVAL * 3 && elapsed < EXIT_POLL_INTERVAL * 4, "{elapsed:?}");
    assert_eq!(processes.checks.load(Ordering::SeqCst), 4);
}
