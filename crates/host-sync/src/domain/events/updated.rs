use std::fmt;
use std::sync::Arc;

use error_stack::Report;
use tokio::select;
use tokio_util::sync::CancellationToken;

use super::EventError;
use super::EventMeta;
use super::EventResult;
use super::LabelSet;
use super::EVENT_TIMEOUT;
use crate::domain::machine::MachineClient;
use crate::domain::reconciler::MachineReconciler;

/// A host's metadata changed; its labels must be written to the Machine.
///
/// `labels` and `client` are optional so that malformed producer input is
/// rejected by the handler instead of being unrepresentable.
#[derive(Default)]
pub struct HostUpdated {
    pub meta: EventMeta,
    pub labels: Option<LabelSet>,
    pub client: Option<Arc<dyn MachineClient>>,
}

impl fmt::Debug for HostUpdated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostUpdated")
            .field("meta", &self.meta)
            .field("labels", &self.labels)
            .field("client", &self.client.as_ref().map(|_| "MachineClient"))
            .finish()
    }
}

impl HostUpdated {
    pub fn new(meta: EventMeta, labels: LabelSet, client: Arc<dyn MachineClient>) -> Self {
        Self {
            meta,
            labels: Some(labels),
            client: Some(client),
        }
    }

    /// Validate the event, then resolve the Machine and write its labels.
    ///
    /// The Kubernetes work runs in a child scope of `token` bounded by
    /// [`EVENT_TIMEOUT`]; the scope is cancelled on every exit path.
    ///
    /// # Errors
    ///
    /// - [`EventError::EmptyHostId`] / [`EventError::EmptyProjectId`] on a bad identity
    /// - [`EventError::NilKubeClient`] / [`EventError::NilLabels`] on missing fields
    /// - [`EventError::MachineLookup`] / [`EventError::LabelUpdate`] from the reconciler
    /// - [`EventError::Timeout`] / [`EventError::Cancelled`] if the scope ends first
    pub(super) async fn handle(&self, token: &CancellationToken) -> EventResult {
        let identity = &self.meta.identity;
        identity.validate()?;
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| Report::new(EventError::NilKubeClient))?;
        let labels = self
            .labels
            .as_ref()
            .ok_or_else(|| Report::new(EventError::NilLabels))?;

        let scope = token.child_token();
        let _scope_guard = scope.clone().drop_guard();
        let reconciler = MachineReconciler::new(client);

        select! {
            _ = scope.cancelled() => Err(Report::new(EventError::Cancelled)),
            result = tokio::time::timeout(EVENT_TIMEOUT, reconciler.apply_labels(identity, labels)) => {
                result.unwrap_or_else(|_| {
                    Err(Report::new(EventError::Timeout {
                        seconds: EVENT_TIMEOUT.as_secs(),
                    }))
                })
            }
        }
    }
}
