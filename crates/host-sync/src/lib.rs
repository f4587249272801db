//! Synchronises host metadata from an inventory watch stream onto Cluster API
//! Machine labels.

pub mod app;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use domain::events;
pub use domain::sink;
