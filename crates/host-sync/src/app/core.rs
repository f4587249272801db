use std::sync::Arc;

use anyhow::Result;

use crate::app::tasks::Tasks;
use crate::config::DaemonArgs;
use crate::domain::machine::MachineClient;
use crate::infrastructure::inventory::InventoryClient;

/// Application core structure with explicit dependencies
pub struct Application {
    machine_client: Arc<dyn MachineClient>,
    inventory: Arc<dyn InventoryClient>,
    daemon_args: DaemonArgs,
}

impl Application {
    pub fn new(
        machine_client: Arc<dyn MachineClient>,
        inventory: Arc<dyn InventoryClient>,
        daemon_args: DaemonArgs,
    ) -> Self {
        Self {
            machine_client,
            inventory,
            daemon_args,
        }
    }

    /// Start the pipeline and wait for a shutdown signal or for a task to end
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Starting host event pipeline...");

        let events = self.inventory.watch_hosts().await.map_err(|e| {
            anyhow::anyhow!("failed to start inventory watch: {e:?}")
        })?;

        let mut tasks = Tasks::new();
        tasks.spawn_pipeline(events, self.machine_client.clone());

        if let Err(e) = tasks
            .wait_for_completion(self.daemon_args.shutdown_timeout())
            .await
        {
            tracing::error!("Error during task execution: {}", e);
            return Err(e);
        }

        tracing::info!("Host event pipeline stopped");
        Ok(())
    }

    /// Release the upstream subscription
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down application...");
        self.inventory.shutdown().await;
        tracing::info!("Application shutdown completed");
        Ok(())
    }
}
