// Shared automation surface (package: diagram_sdk.automation)
// Contains: ProjectIdentifier, Application service, DisconnectRequest
pub mod diagram_sdk {
    pub mod automation {
        include!(concat!(env!("OUT_DIR"), "/diagram_sdk.automation.rs"));
    }
}

// FlexLogger-specific surface (package: flexlogger.automation)
// Contains: FlexLoggerApplication and Project services
pub mod flexlogger {
    pub mod automation {
        include!(concat!(env!("OUT_DIR"), "/flexlogger.automation.rs"));
    }
}

pub use diagram_sdk::automation::application_client::ApplicationClient;
pub use diagram_sdk::automation::{DisconnectRequest, ProjectIdentifier};
pub use flexlogger::automation::flex_logger_application_client::FlexLoggerApplicationClient;
pub use flexlogger::automation::project_client::ProjectClient;
pub use flexlogger::automation::{
    CloseProjectRequest, GetActiveProjectRequest, GetVersionRequest, OpenProjectRequest,
};
