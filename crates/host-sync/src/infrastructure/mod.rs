pub mod inventory;
pub mod k8s;
