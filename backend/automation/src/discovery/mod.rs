//! Locating, launching and inspecting the FlexLogger process.
//!
//! This module provides functionality for:
//! - Resolving the installed `FlexLogger.exe` from the registry
//! - Launching FlexLogger and rendezvousing with it to learn its automation port
//! - Detecting the port of an instance that is already running
//! - Mapping the automation port back to the owning process, and waiting for it to exit
//!
//! # Platform seams
//!
//! Every OS facility sits behind a trait so the lifecycle can be driven without a real
//! FlexLogger installation. [`Platform::native`] wires the real implementations; on
//! anything other than Windows the registry and rendezvous pieces report errors.

pub mod launch;
pub mod port_file;
pub mod process;
pub mod registry;
pub mod rendezvous;

use launch::{NativeLauncher, ProcessLauncher};
use process::{ProcessTable, SystemProcessTable};
use registry::{InstallRegistry, NativeRegistry};
use rendezvous::{NativeRendezvous, Rendezvous};

use std::sync::Arc;

/// The OS facilities the connector depends on.
#[derive(Clone)]
pub struct Platform {
    pub registry: Arc<dyn InstallRegistry>,
    pub rendezvous: Arc<dyn Rendezvous>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub processes: Arc<dyn ProcessTable>,
}

impl Platform {
    /// Real registry, Win32 rendezvous, tokio process spawning and the system process table.
    pub fn native() -> Self {
        Self {
            registry: Arc::new(NativeRegistry::default()),
            rendezvous: Arc::new(NativeRendezvous::default()),
            launcher: Arc::new(NativeLauncher),
            processes: Arc::new(SystemProcessTable),
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::native()
    }
}
