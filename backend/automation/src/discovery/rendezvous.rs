//! Launch rendezvous with a freshly spawned FlexLogger.
//!
//! FlexLogger is started with the names of a named event and of a 4-byte file
//! mapping. Once its automation server is listening it writes the port into the
//! mapping (native-endian `i32`) and signals the event.

use crate::error::launch::LaunchError;

/// Result of checking the ready event once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    Pending,
    Failed(u32),
}

/// A named ready event owned by one launch attempt.
///
/// The underlying OS handle is released on drop.
pub trait ReadyEvent: Send + Sync {
    /// Check the event without blocking.
    fn poll(&self) -> WaitOutcome;
}

/// Creates ready events and reads the port FlexLogger publishes.
pub trait Rendezvous: Send + Sync {
    /// Create a named, unsignaled, auto-reset event.
    fn create_ready_event(&self, name: &str) -> Result<Box<dyn ReadyEvent>, LaunchError>;

    /// Read the port from the file mapping named `mapped_file_name`.
    fn read_port(&self, mapped_file_name: &str) -> Result<i32, LaunchError>;
}

#[cfg(windows)]
mod native {
    use super::{ReadyEvent, Rendezvous, WaitOutcome};
    use crate::error::launch::LaunchError;

    use common::ErrorLocation;

    use std::panic::Location;

    use log::trace;
    use windows::Win32::Foundation::{CloseHandle, FALSE, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
    use windows::Win32::System::Memory::{
        FILE_MAP_READ, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile,
    };
    use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject};
    use windows::core::{HSTRING, PCWSTR};

    const PORT_SIZE: usize = size_of::<i32>();

    pub struct NamedEvent {
        handle: HANDLE,
    }

    // Event handles may be waited on and closed from any thread.
    unsafe impl Send for NamedEvent {}
    unsafe impl Sync for NamedEvent {}

    impl ReadyEvent for NamedEvent {
        fn poll(&self) -> WaitOutcome {
            let result = unsafe { WaitForSingleObject(self.handle, 0) };

            if result.0 == WAIT_OBJECT_0.0 {
                WaitOutcome::Signaled
            } else if result.0 == WAIT_TIMEOUT.0 {
                WaitOutcome::Pending
            } else {
                WaitOutcome::Failed(result.0)
            }
        }
    }

    impl Drop for NamedEvent {
        fn drop(&mut self) {
            trace!("Closing ready event handle");
            let _ = unsafe { CloseHandle(self.handle) };
        }
    }

    #[derive(Debug, Default)]
    pub struct Win32Rendezvous;

    impl Rendezvous for Win32Rendezvous {
        fn create_ready_event(&self, name: &str) -> Result<Box<dyn ReadyEvent>, LaunchError> {
            let name = HSTRING::from(name);
            let handle = unsafe { CreateEventW(None, FALSE, FALSE, PCWSTR(name.as_ptr())) }
                .map_err(|e| LaunchError::Wait {
                    message: format!("Failed to create launch event: {e}"),
                    code: e.code().0 as u32,
                    location: ErrorLocation::from(Location::caller()),
                })?;

            Ok(Box::new(NamedEvent { handle }))
        }

        fn read_port(&self, mapped_file_name: &str) -> Result<i32, LaunchError> {
            let name = HSTRING::from(mapped_file_name);
            let mapping = unsafe { OpenFileMappingW(FILE_MAP_READ.0, FALSE, PCWSTR(name.as_ptr())) }
                .map_err(|e| LaunchError::SharedMemory {
                    message: format!("Failed to open file mapping {mapped_file_name}: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                })?;

            let view = unsafe { MapViewOfFile(mapping, FILE_MAP_READ, 0, 0, PORT_SIZE) };

            let port = if view.Value.is_null() {
                Err(LaunchError::SharedMemory {
                    message: format!("Failed to map view of {mapped_file_name}"),
                    location: ErrorLocation::from(Location::caller()),
                })
            } else {
                let port = unsafe { std::ptr::read_unaligned(view.Value as *const i32) };
                let _ = unsafe { UnmapViewOfFile(view) };
                Ok(port)
            };

            let _ = unsafe { CloseHandle(mapping) };
            port
        }
    }
}

#[cfg(not(windows))]
mod native {
    use super::{ReadyEvent, Rendezvous};
    use crate::error::launch::LaunchError;

    use common::ErrorLocation;

    use std::panic::Location;

    /// Named events and file mappings are Windows objects; every call fails.
    #[derive(Debug, Default)]
    pub struct UnsupportedRendezvous;

    impl Rendezvous for UnsupportedRendezvous {
        fn create_ready_event(&self, _name: &str) -> Result<Box<dyn ReadyEvent>, LaunchError> {
            Err(LaunchError::Wait {
                message: "Launching FlexLogger is only supported on Windows".to_string(),
                code: 0,
                location: ErrorLocation::from(Location::caller()),
            })
        }

        fn read_port(&self, _mapped_file_name: &str) -> Result<i32, LaunchError> {
            Err(LaunchError::SharedMemory {
                message: "Shared memory rendezvous is only supported on Windows".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
        }
    }
}

#[cfg(windows)]
pub type NativeRendezvous = native::Win32Rendezvous;

#[cfg(not(windows))]
pub type NativeRendezvous = native::UnsupportedRendezvous;
