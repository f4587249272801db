//! Port to the cluster-orchestration API that owns Machine objects.

use core::error::Error;

use derive_more::Display;
use error_stack::Report;

use crate::domain::events::LabelSet;

/// A Machine resolved for a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Machine {
    pub name: String,
    pub labels: LabelSet,
}

/// Errors reported by a [`MachineClient`].
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[display("No Machine found for host {host_id} in namespace {namespace}")]
    NotFound { namespace: String, host_id: String },
    #[display("{count} Machines match host {host_id} in namespace {namespace}")]
    Ambiguous {
        namespace: String,
        host_id: String,
        count: usize,
    },
    #[display("Conflicting update of Machine {machine_name} in namespace {namespace}")]
    Conflict {
        namespace: String,
        machine_name: String,
    },
    #[display("Kubernetes API request failed: {message}")]
    Transport { message: String },
}

impl Error for MachineError {}

/// Operations the reconciler needs from the Kubernetes side.
///
/// Implementations must be safe to call concurrently; the sink calls them
/// serially today but the client is shared by every update event.
#[async_trait::async_trait]
pub trait MachineClient: Send + Sync {
    /// Locate the unique Machine in `namespace` that represents `host_id`.
    ///
    /// # Errors
    ///
    /// - [`MachineError::NotFound`] if no Machine matches
    /// - [`MachineError::Ambiguous`] if more than one Machine matches
    /// - [`MachineError::Transport`] if the API request fails
    async fn get_machine_by_host_id(
        &self,
        namespace: &str,
        host_id: &str,
    ) -> Result<Machine, Report<MachineError>>;

    /// Merge `labels` onto the named Machine, last write wins per key.
    ///
    /// # Errors
    ///
    /// - [`MachineError::Conflict`] on a write conflict
    /// - [`MachineError::Transport`] if the API request fails
    async fn set_machine_labels(
        &self,
        namespace: &str,
        machine_name: &str,
        labels: &LabelSet,
    ) -> Result<(), Report<MachineError>>;
}
