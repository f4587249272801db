//! Kubernetes integration module.
//!
//! - [`init_kube_client`]: builds the API client from kubeconfig or cluster defaults
//! - [`KubeMachineClient`]: the [`MachineClient`](crate::domain::machine::MachineClient)
//!   backed by Cluster API `Machine` objects

pub mod kube_client;
pub mod machine_client;
pub mod types;

pub use kube_client::init_kube_client;
pub use machine_client::KubeMachineClient;
pub use types::KubernetesError;
