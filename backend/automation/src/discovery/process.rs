use crate::FLEXLOGGER_EXE_NAME;
use crate::error::discovery::DiscoveryError;

use common::ErrorLocation;

use std::collections::BTreeSet;
use std::panic::Location;
use std::time::{Duration, Instant as StdInstant};

use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use backoff::Clock;
use log::{debug, trace, warn};
use netstat2::{AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, SocketInfo, get_sockets_info};
use sysinfo::{Pid, Process, ProcessesToUpdate, System};
use tokio::time::{Instant, sleep};

pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const APP_CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Process and socket queries used to follow the FlexLogger process.
pub trait ProcessTable: Send + Sync {
    /// The FlexLogger process holding a TCP socket on `port`, other than this process.
    fn find_host_pid(&self, port: u16) -> Result<Option<u32>, DiscoveryError>;

    /// True while `pid` names a running FlexLogger process.
    fn is_host_process(&self, pid: u32) -> bool;
}

/// [`ProcessTable`] backed by the OS socket table and process list.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn find_host_pid(&self, port: u16) -> Result<Option<u32>, DiscoveryError> {
        let sockets = query_tcp_sockets()?;
        let candidates = candidate_pids(
            sockets.iter().filter_map(tcp_local_port),
            port,
            std::process::id(),
        );

        trace!("Processes with a socket on port {port}: {candidates:?}");

        for pid in candidates {
            if self.is_host_process(pid) {
                debug!("FlexLogger (PID: {pid}) owns automation port {port}");
                return Ok(Some(pid));
            }
        }

        debug!("No FlexLogger process found on port {port}");
        Ok(None)
    }

    fn is_host_process(&self, pid: u32) -> bool {
        with_process(pid, |p| is_host_executable(&process_name(p))).unwrap_or(false)
    }
}

#[track_caller]
fn query_tcp_sockets() -> Result<Vec<SocketInfo>, DiscoveryError> {
    get_sockets_info(
        AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6,
        ProtocolFlags::TCP,
    )
    .map_err(|e| DiscoveryError::NetworkQuery {
        message: format!("Failed to query network sockets: {e}"),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    })
}

fn tcp_local_port(socket: &SocketInfo) -> Option<(u16, &[u32])> {
    match &socket.protocol_socket_info {
        ProtocolSocketInfo::Tcp(tcp) => Some((tcp.local_port, socket.associated_pids.as_slice())),
        ProtocolSocketInfo::Udp(_) => None,
    }
}

/// PIDs holding a socket whose local port is `port`, excluding `own_pid`.
///
/// `sockets` yields `(local_port, associated_pids)` pairs.
pub(crate) fn candidate_pids<'a, I>(sockets: I, port: u16, own_pid: u32) -> BTreeSet<u32>
where
    I: IntoIterator<Item = (u16, &'a [u32])>,
{
    sockets
        .into_iter()
        .filter(|(local_port, _)| *local_port == port)
        .flat_map(|(_, pids)| pids.iter().copied())
        .filter(|&pid| pid != own_pid)
        .collect()
}

pub(crate) fn is_host_executable(name: &str) -> bool {
    name.eq_ignore_ascii_case(FLEXLOGGER_EXE_NAME)
}

pub(crate) fn with_process<F, R>(pid: u32, f: F) -> Option<R>
where
    F: FnOnce(&Process) -> R,
{
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    sys.process(pid).map(f)
}

pub(crate) fn process_name(process: &Process) -> String {
    process.name().to_string_lossy().to_string()
}

/// Backoff clock that follows tokio time, so the exit wait honours a paused runtime.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> StdInstant {
        Instant::now().into_std()
    }
}

pub(crate) fn exit_wait_backoff() -> ExponentialBackoff<TokioClock> {
    ExponentialBackoff {
        current_interval: EXIT_POLL_INTERVAL,
        initial_interval: EXIT_POLL_INTERVAL,
        randomization_factor: 0.0,
        multiplier: 1.0,
        max_interval: EXIT_POLL_INTERVAL,
        start_time: TokioClock.now(),
        max_elapsed_time: Some(APP_CLOSE_TIMEOUT),
        clock: TokioClock,
    }
}

/// Wait for `pid` to stop naming a FlexLogger process.
///
/// Polls every 200 ms for up to 60 s. A PID reused by an unrelated process counts
/// as exited.
///
/// # Returns
///
/// * `true` - If the process exited
/// * `false` - If it was still running when the wait expired
pub async fn wait_for_exit(processes: &dyn ProcessTable, pid: u32) -> bool {
    let mut backoff = exit_wait_backoff();

    loop {
        if !processes.is_host_process(pid) {
            debug!("FlexLogger (PID: {pid}) has exited");
            return true;
        }

        match backoff.next_backoff() {
            Some(duration) => {
                trace!("FlexLogger (PID: {pid}) still running, checking again in {duration:?}");
                sleep(duration).await;
            }
            None => {
                warn!("FlexLogger (PID: {pid}) still running after {APP_CLOSE_TIMEOUT:?}");
                return false;
            }
        }
    }
}
