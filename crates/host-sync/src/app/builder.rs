use std::sync::Arc;

use anyhow::Result;

use crate::app::Application;
use crate::config::DaemonArgs;
use crate::infrastructure::inventory::NdjsonInventory;
use crate::infrastructure::k8s::init_kube_client;
use crate::infrastructure::k8s::KubeMachineClient;

/// Application builder
pub struct ApplicationBuilder {
    daemon_args: DaemonArgs,
}

impl ApplicationBuilder {
    pub fn new(daemon_args: DaemonArgs) -> Self {
        Self { daemon_args }
    }

    /// Connect to Kubernetes and prepare the inventory subscription
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let kube_client = init_kube_client(self.daemon_args.kubeconfig.as_deref())
            .await
            .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {e:?}"))?;
        let machine_client = Arc::new(KubeMachineClient::new(kube_client));

        let inventory = Arc::new(NdjsonInventory::init(self.daemon_args.inventory_options()));

        Ok(Application::new(machine_client, inventory, self.daemon_args))
    }
}
