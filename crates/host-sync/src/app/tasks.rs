use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::machine::MachineClient;
use crate::domain::sink::EventSink;
use crate::infrastructure::inventory::InventoryWatcher;
use crate::infrastructure::inventory::WatchEvent;

/// Task manager, responsible for starting and managing the pipeline tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Start the event sink and the inventory watcher feeding it
    pub fn spawn_pipeline(
        &mut self,
        events: mpsc::Receiver<WatchEvent>,
        machine_client: Arc<dyn MachineClient>,
    ) {
        let (sender, sink_task) = EventSink::spawn(self.cancellation_token.clone());
        self.tasks.push(sink_task);

        let token = self.cancellation_token.clone();
        let watcher = InventoryWatcher::new(machine_client, sender);
        self.tasks.push(tokio::spawn(async move {
            tracing::info!("Starting inventory watcher task");
            if let Err(e) = watcher.run(events, token.clone()).await {
                tracing::error!("Inventory watcher failed: {e:?}");
                token.cancel();
            } else {
                tracing::info!("Inventory watcher completed");
            }
            // dropping the watcher closes the sink input so the sink drains
        }));
    }

    /// wait for tasks to complete or receive shutdown signal
    pub async fn wait_for_completion(&mut self, shutdown_timeout: Duration) -> Result<()> {
        let signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                        return;
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        self.wait_for(signal_handler, shutdown_timeout).await
    }

    /// Run until `shutdown` resolves or any task ends.
    ///
    /// A shutdown or a failed task cancels the pipeline. A task that ends
    /// cleanly lets the others drain first; they are cancelled only if they
    /// are still running after `shutdown_timeout`.
    pub async fn wait_for<F>(&mut self, shutdown: F, shutdown_timeout: Duration) -> Result<()>
    where
        F: std::future::Future + Unpin,
    {
        if self.tasks.is_empty() {
            return Ok(());
        }

        let finished = tokio::select! {
            _ = shutdown => None,
            (result, index, _) = futures::future::select_all(self.tasks.iter_mut()) => {
                Some((result, index))
            }
        };

        let (result, drain): (Result<()>, bool) = match finished {
            None => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
                (Ok(()), false)
            }
            Some((result, index)) => {
                // a completed JoinHandle must not be polled again
                drop(self.tasks.remove(index));
                match result {
                    Err(e) => {
                        tracing::error!("Task completed with error: {e}");
                        (Err(e.into()), false)
                    }
                    Ok(()) => {
                        tracing::info!("Task completed, draining the pipeline");
                        (Ok(()), true)
                    }
                }
            }
        };

        if !drain {
            self.cancellation_token.cancel();
        }
        if !self.wait_for_tasks_with_timeout(shutdown_timeout).await && drain {
            tracing::warn!("Pipeline did not drain, cancelling remaining tasks");
            self.cancellation_token.cancel();
            self.wait_for_tasks_with_timeout(shutdown_timeout).await;
        }
        self.cancellation_token.cancel();
        result
    }

    /// Await every task in turn, returning whether all of them finished in time.
    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while let Some(task) = self.tasks.first_mut() {
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
                drop(self.tasks.remove(0));
            }
        })
        .await
        .map_err(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        })
        .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_log::test;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;

    use super::*;
    use crate::domain::mock::StubMachineClient;
    use crate::infrastructure::inventory::HostResource;
    use crate::infrastructure::inventory::WatchEventKind;

    fn updated_host(metadata: &str) -> WatchEvent {
        WatchEvent::new(
            WatchEventKind::Updated,
            HostResource {
                resource_id: "h-1".to_string(),
                tenant_id: "p-1".to_string(),
                name: "edge".to_string(),
                metadata: metadata.to_string(),
            },
        )
    }

    #[test(tokio::test)]
    async fn pipeline_stops_when_upstream_closes() {
        let stub = StubMachineClient::new();
        stub.add_machine("p-1", "h-1", "machine-1");
        let (tx, rx) = mpsc::channel(4);
        tx.send(updated_host(r#"[{"key":"role","value":"edge"}]"#))
            .await
            .expect("queue event");
        drop(tx);

        let mut tasks = Tasks::new();
        tasks.spawn_pipeline(rx, Arc::new(stub.clone()));

        timeout(
            Duration::from_secs(5),
            tasks.wait_for(futures::future::pending::<()>(), Duration::from_secs(2)),
        )
        .await
        .expect("pipeline should stop on its own")
        .expect("pipeline should stop cleanly");

        assert!(tasks.cancellation_token().is_cancelled());
        similar_asserts::assert_eq!(
            stub.labels("p-1", "machine-1"),
            Some([("role".to_string(), "edge".to_string())].into())
        );
    }

    #[test(tokio::test)]
    async fn final_event_is_applied_after_upstream_closes() {
        let gate = Arc::new(Semaphore::new(0));
        let stub = StubMachineClient::new().with_gate(gate.clone());
        stub.add_machine("p-1", "h-1", "machine-1");
        let (tx, rx) = mpsc::channel(4);
        tx.send(updated_host(r#"[{"key":"role","value":"last"}]"#))
            .await
            .expect("queue event");
        drop(tx);

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            gate.add_permits(1);
        });

        let mut tasks = Tasks::new();
        tasks.spawn_pipeline(rx, Arc::new(stub.clone()));
        timeout(
            Duration::from_secs(5),
            tasks.wait_for(futures::future::pending::<()>(), Duration::from_secs(2)),
        )
        .await
        .expect("pipeline should drain on its own")
        .expect("pipeline should stop cleanly");
        releaser.await.expect("releaser should finish");

        similar_asserts::assert_eq!(
            stub.labels("p-1", "machine-1"),
            Some([("role".to_string(), "last".to_string())].into())
        );
    }

    #[test(tokio::test)]
    async fn shutdown_future_cancels_tasks() {
        let (_tx, rx) = mpsc::channel(4);
        let mut tasks = Tasks::new();
        tasks.spawn_pipeline(rx, Arc::new(StubMachineClient::new()));

        timeout(
            Duration::from_secs(5),
            tasks.wait_for(futures::future::ready(()), Duration::from_secs(2)),
        )
        .await
        .expect("shutdown should be quick")
        .expect("shutdown should be clean");

        assert!(tasks.cancellation_token().is_cancelled());
        assert!(tasks.tasks.is_empty());
    }
}
