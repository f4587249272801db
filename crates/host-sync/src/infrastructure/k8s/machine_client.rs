use std::collections::BTreeSet;

use error_stack::Report;
use kube::api::ListParams;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::core::ApiResource;
use kube::core::DynamicObject;
use kube::core::GroupVersionKind;
use kube::Api;
use kube::Client;
use kube::ResourceExt;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use crate::domain::events::LabelSet;
use crate::domain::machine::Machine;
use crate::domain::machine::MachineClient;
use crate::domain::machine::MachineError;

const MACHINE_GROUP: &str = "cluster.x-k8s.io";
const MACHINE_VERSION: &str = "v1beta1";
const MACHINE_KIND: &str = "Machine";

/// Annotation listing the label keys this daemon wrote last time.
pub const MANAGED_LABELS_ANNOTATION: &str = "host-sync.io/managed-labels";

/// [`MachineClient`] backed by Cluster API `Machine` objects.
///
/// A host maps to the Machine whose `spec.providerID` equals the host id or
/// ends with `/<host id>`. Node references are not consulted.
#[derive(Clone)]
pub struct KubeMachineClient {
    client: Client,
    resource: ApiResource,
}

impl KubeMachineClient {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(MACHINE_GROUP, MACHINE_VERSION, MACHINE_KIND);
        Self {
            client,
            resource: ApiResource::from_gvk(&gvk),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

#[async_trait::async_trait]
impl MachineClient for KubeMachineClient {
    async fn get_machine_by_host_id(
        &self,
        namespace: &str,
        host_id: &str,
    ) -> Result<Machine, Report<MachineError>> {
        let machines = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(transport_error)?;

        let mut matching: Vec<DynamicObject> = machines
            .items
            .into_iter()
            .filter(|machine| {
                provider_id(machine).is_some_and(|id| provider_id_matches(id, host_id))
            })
            .collect();

        match matching.len() {
            1 => {
                let machine = matching.remove(0);
                Ok(Machine {
                    name: machine.name_any(),
                    labels: machine.labels().clone(),
                })
            }
            0 => Err(Report::new(MachineError::NotFound {
                namespace: namespace.to_string(),
                host_id: host_id.to_string(),
            })),
            count => Err(Report::new(MachineError::Ambiguous {
                namespace: namespace.to_string(),
                host_id: host_id.to_string(),
                count,
            })),
        }
    }

    async fn set_machine_labels(
        &self,
        namespace: &str,
        machine_name: &str,
        labels: &LabelSet,
    ) -> Result<(), Report<MachineError>> {
        let api = self.api(namespace);
        let machine = api.get(machine_name).await.map_err(transport_error)?;
        let previously_managed = machine
            .annotations()
            .get(MANAGED_LABELS_ANNOTATION)
            .map(String::as_str);

        let patch = label_patch(previously_managed, labels);
        debug!(namespace, machine = machine_name, %patch, "Patching Machine labels");

        api.patch(machine_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| match e {
                kube::Error::Api(response) if response.code == 409 => {
                    Report::new(MachineError::Conflict {
                        namespace: namespace.to_string(),
                        machine_name: machine_name.to_string(),
                    })
                    .attach_printable(response.message)
                }
                other => transport_error(other),
            })?;
        Ok(())
    }
}

fn transport_error(e: kube::Error) -> Report<MachineError> {
    Report::new(MachineError::Transport {
        message: e.to_string(),
    })
}

fn provider_id(machine: &DynamicObject) -> Option<&str> {
    machine.data.get("spec")?.get("providerID")?.as_str()
}

/// Whether a Machine provider id refers to `host_id`.
fn provider_id_matches(provider_id: &str, host_id: &str) -> bool {
    provider_id == host_id
        || provider_id
            .strip_suffix(host_id)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

/// Merge patch that writes `labels` and removes keys written previously but
/// absent now.
fn label_patch(previously_managed: Option<&str>, labels: &LabelSet) -> Value {
    let mut label_changes = Map::new();
    for stale in managed_keys(previously_managed) {
        if !labels.contains_key(stale) {
            label_changes.insert(stale.to_string(), Value::Null);
        }
    }
    for (key, value) in labels {
        label_changes.insert(key.clone(), Value::String(value.clone()));
    }

    let managed = labels.keys().cloned().collect::<Vec<_>>().join(",");
    json!({
        "metadata": {
            "labels": label_changes,
            "annotations": { MANAGED_LABELS_ANNOTATION: managed },
        }
    })
}

fn managed_keys(annotation: Option<&str>) -> BTreeSet<&str> {
    annotation
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .collect()
}
