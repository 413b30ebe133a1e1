use crate::application::guard::ConnectionGuard;
use crate::application::rpc_failure;
use crate::error::AutomationError;
use crate::proto::{CloseProjectRequest, ProjectClient, ProjectIdentifier};

use std::sync::Arc;

use log::info;
use tonic::transport::Channel;

/// A project open in FlexLogger.
#[derive(Clone)]
pub struct Project {
    channel: Channel,
    guard: Arc<dyn ConnectionGuard>,
    identifier: ProjectIdentifier,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl Project {
    pub(crate) fn new(
        channel: Channel,
        guard: Arc<dyn ConnectionGuard>,
        identifier: ProjectIdentifier,
    ) -> Self {
        Self {
            channel,
            guard,
            identifier,
        }
    }

    pub fn identifier(&self) -> &ProjectIdentifier {
        &self.identifier
    }

    /// Close the project without prompting to save changes.
    ///
    /// # Errors
    ///
    /// Fails with an already-closed error if the application was closed or
    /// disconnected, otherwise with the wrapped RPC error.
    pub async fn close(&self) -> Result<(), AutomationError> {
        self.guard.raise_if_closed()?;

        let mut client = ProjectClient::new(self.channel.clone());
        client
            .close(CloseProjectRequest {
                project: Some(self.identifier.clone()),
                allow_prompts: false,
            })
            .await
            .map_err(|status| rpc_failure(self.guard.as_ref(), "Failed to close project", &status))?;

        info!("Closed project {}", self.identifier.id);
        Ok(())
    }
}
