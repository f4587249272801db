//! Test double for the Machine port
//!
//! [`StubMachineClient`] keeps Machines in memory, records every call in order
//! and can be told to fail, panic or block so sink behaviour can be exercised
//! without a cluster.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use error_stack::Report;
use tokio::sync::Semaphore;

use crate::domain::events::LabelSet;
use crate::domain::machine::Machine;
use crate::domain::machine::MachineClient;
use crate::domain::machine::MachineError;

/// A call observed by [`StubMachineClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineCall {
    GetMachineByHostId {
        namespace: String,
        host_id: String,
    },
    SetMachineLabels {
        namespace: String,
        machine_name: String,
        labels: LabelSet,
    },
}

#[derive(Default)]
struct StubState {
    /// (namespace, host id) -> machine names claiming that host
    hosts: HashMap<(String, String), Vec<String>>,
    /// (namespace, machine name) -> labels
    machines: HashMap<(String, String), LabelSet>,
    calls: Vec<MachineCall>,
    fail_updates: bool,
    panic_on_lookup: bool,
}

/// In-memory [`MachineClient`].
#[derive(Clone, Default)]
pub struct StubMachineClient {
    state: Arc<Mutex<StubState>>,
    gate: Option<Arc<Semaphore>>,
}

impl StubMachineClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Machine named `machine_name` for `host_id` in `namespace`.
    pub fn add_machine(&self, namespace: &str, host_id: &str, machine_name: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .hosts
            .entry((namespace.to_string(), host_id.to_string()))
            .or_default()
            .push(machine_name.to_string());
        state
            .machines
            .entry((namespace.to_string(), machine_name.to_string()))
            .or_default();
    }

    /// Make every label update fail with a conflict.
    pub fn set_fail_updates(&self, enabled: bool) {
        self.state.lock().unwrap().fail_updates = enabled;
    }

    /// Make every lookup panic.
    pub fn set_panic_on_lookup(&self, enabled: bool) {
        self.state.lock().unwrap().panic_on_lookup = enabled;
    }

    /// Every label update waits for one permit of `gate` before it proceeds.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<MachineCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn labels(&self, namespace: &str, machine_name: &str) -> Option<LabelSet> {
        self.state
            .lock()
            .unwrap()
            .machines
            .get(&(namespace.to_string(), machine_name.to_string()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl MachineClient for StubMachineClient {
    async fn get_machine_by_host_id(
        &self,
        namespace: &str,
        host_id: &str,
    ) -> Result<Machine, Report<MachineError>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MachineCall::GetMachineByHostId {
            namespace: namespace.to_string(),
            host_id: host_id.to_string(),
        });
        if state.panic_on_lookup {
            // release the lock first so the stub stays usable after the panic
            drop(state);
            panic!("stub lookup panic for {host_id}");
        }

        let names = state
            .hosts
            .get(&(namespace.to_string(), host_id.to_string()))
            .cloned()
            .unwrap_or_default();
        match names.as_slice() {
            [name] => Ok(Machine {
                name: name.clone(),
                labels: state
                    .machines
                    .get(&(namespace.to_string(), name.clone()))
                    .cloned()
                    .unwrap_or_default(),
            }),
            [] => Err(Report::new(MachineError::NotFound {
                namespace: namespace.to_string(),
                host_id: host_id.to_string(),
            })),
            _ => Err(Report::new(MachineError::Ambiguous {
                namespace: namespace.to_string(),
                host_id: host_id.to_string(),
                count: names.len(),
            })),
        }
    }

    async fn set_machine_labels(
        &self,
        namespace: &str,
        machine_name: &str,
        labels: &LabelSet,
    ) -> Result<(), Report<MachineError>> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(MachineCall::SetMachineLabels {
            namespace: namespace.to_string(),
            machine_name: machine_name.to_string(),
            labels: labels.clone(),
        });
        if state.fail_updates {
            return Err(Report::new(MachineError::Conflict {
                namespace: namespace.to_string(),
                machine_name: machine_name.to_string(),
            }));
        }

        let Some(current) = state
            .machines
            .get_mut(&(namespace.to_string(), machine_name.to_string()))
        else {
            return Err(Report::new(MachineError::Transport {
                message: format!("machine {namespace}/{machine_name} does not exist"),
            }));
        };
        current.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}
