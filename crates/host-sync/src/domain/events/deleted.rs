use tokio_util::sync::CancellationToken;
use tracing::info;

use super::EventMeta;
use super::EventResult;

/// A host was removed from the inventory.
///
/// The Machine is left alone; its lifecycle belongs to the cluster owner.
#[derive(Debug, Default)]
pub struct HostDeleted {
    pub meta: EventMeta,
}

impl HostDeleted {
    pub const fn new(meta: EventMeta) -> Self {
        Self { meta }
    }

    pub(super) async fn handle(&self, _token: &CancellationToken) -> EventResult {
        let identity = &self.meta.identity;
        identity.validate()?;
        info!(
            host_id = %identity.host_id,
            project_id = %identity.project_id,
            "Host deleted"
        );
        Ok(())
    }
}
