use std::sync::Arc;

use error_stack::Report;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::metadata::decode_metadata;
use super::types::InventoryError;
use super::types::WatchEvent;
use super::types::WatchEventKind;
use super::validate::validate_host;
use crate::domain::events::DomainEvent;
use crate::domain::events::EventMeta;
use crate::domain::events::HostCreated;
use crate::domain::events::HostDeleted;
use crate::domain::events::HostUpdated;
use crate::domain::machine::MachineClient;
use crate::domain::sink::EventSender;

/// Translates inventory watch events into domain events for the sink.
///
/// A bad event is dropped with a warning; it never stops the loop.
pub struct InventoryWatcher {
    machine_client: Arc<dyn MachineClient>,
    sink: EventSender,
}

impl InventoryWatcher {
    pub fn new(machine_client: Arc<dyn MachineClient>, sink: EventSender) -> Self {
        Self {
            machine_client,
            sink,
        }
    }

    /// Forward events until the stream ends or `cancellation_token` fires.
    ///
    /// The end of the upstream stream is logged and treated as a clean exit.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::SinkClosed`] if the sink stopped accepting events
    #[tracing::instrument(skip_all)]
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<WatchEvent>,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<InventoryError>> {
        info!("Starting inventory watcher");
        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    debug!("Inventory watcher shutdown requested");
                    return Ok(());
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Inventory watch stream closed");
                        return Ok(());
                    };
                    let Some(domain_event) = self.translate(event) else {
                        continue;
                    };
                    select! {
                        _ = cancellation_token.cancelled() => {
                            debug!("Inventory watcher shutdown requested while forwarding");
                            return Ok(());
                        }
                        sent = self.sink.send(domain_event) => {
                            if sent.is_err() {
                                return Err(Report::new(InventoryError::SinkClosed));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Turn one watch event into a domain event, or `None` if it is dropped.
    pub fn translate(&self, event: WatchEvent) -> Option<DomainEvent> {
        let host = match validate_host(event.host.as_ref()) {
            Ok(host) => host,
            Err(e) => {
                warn!(kind = ?event.kind, "Dropping invalid host event: {e:?}");
                return None;
            }
        };
        let meta = EventMeta::new(host.identity());

        match event.kind {
            WatchEventKind::Created => Some(HostCreated::new(meta).into()),
            WatchEventKind::Deleted => Some(HostDeleted::new(meta).into()),
            WatchEventKind::Updated => match decode_metadata(&host.metadata) {
                Ok(labels) => {
                    Some(HostUpdated::new(meta, labels, self.machine_client.clone()).into())
                }
                Err(e) => {
                    warn!(
                        host_id = %host.resource_id,
                        "Dropping host update with bad metadata: {e:?}"
                    );
                    None
                }
            },
            WatchEventKind::Unknown => {
                debug!(host_id = %host.resource_id, "Ignoring unknown inventory event kind");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use similar_asserts::assert_eq;
    use test_log::test;
    use tokio::time::timeout;

    use super::*;
    use crate::domain::events::HostIdentity;
    use crate::domain::events::LabelSet;
    use crate::domain::mock::StubMachineClient;
    use crate::domain::sink::EventSink;
    use crate::infrastructure::inventory::types::HostResource;

    fn host(resource_id: &str, tenant_id: &str, metadata: &str) -> HostResource {
        HostResource {
            resource_id: resource_id.to_string(),
            tenant_id: tenant_id.to_string(),
            name: "edge".to_string(),
            metadata: metadata.to_string(),
        }
    }

    fn watcher() -> InventoryWatcher {
        let (sender, _handle) = EventSink::spawn(CancellationToken::new());
        InventoryWatcher::new(Arc::new(StubMachineClient::new()), sender)
    }

    #[test(tokio::test)]
    async fn updated_event_uses_tenant_as_project_and_decodes_labels() {
        let watcher = watcher();

        let event = watcher
            .translate(WatchEvent::new(
                WatchEventKind::Updated,
                host(
                    "host-1",
                    "tenant-1",
                    r#"[{"key":"host-label","value":"true"},{"key":"test-label","value":"true"}]"#,
                ),
            ))
            .expect("event should translate");

        let DomainEvent::Updated(updated) = event else {
            panic!("expected update, got {event:?}");
        };
        assert_eq!(
            updated.meta.identity,
            HostIdentity::new("host-1", "tenant-1")
        );
        assert_eq!(
            updated.labels,
            Some(LabelSet::from([
                ("host-label".to_string(), "true".to_string()),
                ("test-label".to_string(), "true".to_string()),
            ]))
        );
        assert!(updated.client.is_some());
        assert!(updated.meta.result.is_none());
    }

    #[test(tokio::test)]
    async fn created_and_deleted_carry_identity() {
        let watcher = watcher();

        let created = watcher
            .translate(WatchEvent::new(
                WatchEventKind::Created,
                host("h-1", "p-1", ""),
            ))
            .expect("created translates");
        let deleted = watcher
            .translate(WatchEvent::new(
                WatchEventKind::Deleted,
                host("h-1", "p-1", "garbage"),
            ))
            .expect("deleted ignores metadata");

        assert_eq!(created.kind(), "created");
        assert_eq!(deleted.kind(), "deleted");
        assert_eq!(created.identity(), &HostIdentity::new("h-1", "p-1"));
        assert_eq!(deleted.identity(), &HostIdentity::new("h-1", "p-1"));
    }

    #[test(tokio::test)]
    async fn bad_events_are_dropped() {
        let watcher = watcher();

        assert!(watcher
            .translate(WatchEvent {
                kind: WatchEventKind::Created,
                host: None,
            })
            .is_none());
        assert!(watcher
            .translate(WatchEvent::new(WatchEventKind::Created, host("", "p", "")))
            .is_none());
        assert!(watcher
            .translate(WatchEvent::new(
                WatchEventKind::Updated,
                host("h", "p", "{not json")
            ))
            .is_none());
        assert!(watcher
            .translate(WatchEvent::new(WatchEventKind::Unknown, host("h", "p", "")))
            .is_none());
    }

    #[test(tokio::test)]
    async fn run_exits_cleanly_when_stream_closes() {
        let watcher = watcher();
        let (tx, rx) = mpsc::channel(4);
        tx.send(WatchEvent::new(WatchEventKind::Created, host("h", "p", "")))
            .await
            .expect("queue event");
        drop(tx);

        let result = timeout(
            Duration::from_secs(2),
            watcher.run(rx, CancellationToken::new()),
        )
        .await
        .expect("watcher should stop");
        assert!(result.is_ok());
    }

    #[test(tokio::test)]
    async fn run_stops_on_cancellation() {
        let watcher = watcher();
        let (_tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        token.cancel();

        let result = timeout(Duration::from_secs(2), watcher.run(rx, token))
            .await
            .expect("watcher should stop");
        assert!(result.is_ok());
    }

    #[test(tokio::test)]
    async fn run_fails_when_sink_is_gone() {
        let sink_token = CancellationToken::new();
        let (sender, handle) = EventSink::spawn(sink_token.clone());
        sink_token.cancel();
        handle.await.expect("sink should stop");

        let watcher = InventoryWatcher::new(Arc::new(StubMachineClient::new()), sender);
        let (tx, rx) = mpsc::channel(4);
        tx.send(WatchEvent::new(WatchEventKind::Created, host("h", "p", "")))
            .await
            .expect("queue event");

        let err = watcher
            .run(rx, CancellationToken::new())
            .await
            .expect_err("sink is closed");
        assert!(matches!(
            err.current_context(),
            InventoryError::SinkClosed
        ));
    }
}
