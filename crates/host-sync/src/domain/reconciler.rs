//! Writes inventory host labels onto the host's Machine.

use error_stack::ResultExt;
use tracing::debug;
use tracing::info;

use crate::domain::events::EventError;
use crate::domain::events::EventResult;
use crate::domain::events::HostIdentity;
use crate::domain::events::LabelSet;
use crate::domain::machine::MachineClient;

/// Resolves the Machine of a host and applies a label set to it.
///
/// There is no retry here. The inventory re-emits state when it believes the
/// world is inconsistent, so failures go straight back to the caller.
pub struct MachineReconciler<'a> {
    client: &'a dyn MachineClient,
}

impl<'a> MachineReconciler<'a> {
    pub fn new(client: &'a dyn MachineClient) -> Self {
        Self { client }
    }

    /// # Errors
    ///
    /// - [`EventError::MachineLookup`] if the Machine cannot be resolved
    /// - [`EventError::LabelUpdate`] if writing the labels fails
    pub async fn apply_labels(&self, identity: &HostIdentity, labels: &LabelSet) -> EventResult {
        let namespace = identity.project_id.as_str();
        let machine = self
            .client
            .get_machine_by_host_id(namespace, &identity.host_id)
            .await
            .change_context_lazy(|| EventError::MachineLookup {
                namespace: namespace.to_string(),
                host_id: identity.host_id.clone(),
            })?;

        debug!(
            machine = %machine.name,
            current = ?machine.labels,
            desired = ?labels,
            "Resolved Machine for host"
        );

        self.client
            .set_machine_labels(namespace, &machine.name, labels)
            .await
            .change_context_lazy(|| EventError::LabelUpdate {
                namespace: namespace.to_string(),
                machine_name: machine.name.clone(),
            })?;

        info!(
            host_id = %identity.host_id,
            namespace,
            machine = %machine.name,
            count = labels.len(),
            "Machine labels updated"
        );
        Ok(())
    }
}
