use core::error::Error;

use derive_more::Display;
use error_stack::Report;

/// Outcome of handling a single domain event.
pub type EventResult = Result<(), Report<EventError>>;

/// Errors produced while handling a domain event.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum EventError {
    #[display("Host id is empty")]
    EmptyHostId,
    #[display("Project id is empty")]
    EmptyProjectId,
    #[display("Update event carries no Machine client")]
    NilKubeClient,
    #[display("Update event carries no label set")]
    NilLabels,
    #[display("Invalid host resource: {message}")]
    InvalidHostResource { message: String },
    #[display("Failed to look up Machine for host {host_id} in namespace {namespace}")]
    MachineLookup { namespace: String, host_id: String },
    #[display("Failed to set labels on Machine {machine_name} in namespace {namespace}")]
    LabelUpdate {
        namespace: String,
        machine_name: String,
    },
    #[display("Event handling timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[display("Event handling cancelled")]
    Cancelled,
    #[display("Event handler panicked: {message}")]
    HandlerPanicked { message: String },
}

impl EventError {
    /// Validation failures are producer mistakes and are logged at warn level.
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyHostId
                | Self::EmptyProjectId
                | Self::NilKubeClient
                | Self::NilLabels
                | Self::InvalidHostResource { .. }
        )
    }
}

impl Error for EventError {}

/// Errors returned to producers of the event sink.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    #[display("Event sink is closed")]
    Closed,
}

impl Error for SinkError {}
