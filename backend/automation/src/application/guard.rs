//! Closed-connection checks shared with every wrapper object.
//!
//! Wrappers such as [`Project`](crate::Project) hold an `Arc<dyn ConnectionGuard>`
//! handed out by their [`Application`](crate::Application) and consult it before
//! each remote call, so calls made after `close()` or `disconnect()` fail with the
//! same error instead of reaching the channel.

use crate::error::AutomationError;
use crate::error::connection::ConnectionError;

use std::sync::{PoisonError, RwLock};

/// Lifecycle of an [`Application`](crate::Application) connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Closed,
}

/// Reports whether the owning connection is still usable.
pub trait ConnectionGuard: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ConnectionError::AlreadyClosed`] once the connection is closed.
    fn raise_if_closed(&self) -> Result<(), AutomationError>;
}

/// The connection state owned by an application.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: RwLock<ConnectionState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Unconnected),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mark_connected(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state == ConnectionState::Unconnected {
            *state = ConnectionState::Connected;
        }
    }

    /// Closed is terminal; repeated calls are harmless.
    pub(crate) fn mark_closed(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = ConnectionState::Closed;
    }
}

impl ConnectionGuard for Lifecycle {
    fn raise_if_closed(&self) -> Result<(), AutomationError> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Unconnected | ConnectionState::Closed => {
                Err(ConnectionError::already_closed().into())
            }
        }
    }
}

/// Marks the lifecycle closed when dropped, including when a close is cancelled
/// part way through.
pub(crate) struct CloseOnDrop<'a>(pub(crate) &'a Lifecycle);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.mark_closed();
    }
}
