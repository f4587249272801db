use tokio_util::sync::CancellationToken;
use tracing::info;

use super::EventMeta;
use super::EventResult;

/// A host appeared in the inventory.
#[derive(Debug, Default)]
pub struct HostCreated {
    pub meta: EventMeta,
}

impl HostCreated {
    pub const fn new(meta: EventMeta) -> Self {
        Self { meta }
    }

    pub(super) async fn handle(&self, _token: &CancellationToken) -> EventResult {
        let identity = &self.meta.identity;
        identity.validate()?;
        info!(
            host_id = %identity.host_id,
            project_id = %identity.project_id,
            "Host created"
        );
        Ok(())
    }
}
