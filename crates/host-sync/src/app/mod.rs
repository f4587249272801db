//! Application module
//!
//! Wires the Kubernetes and inventory clients into the event pipeline and
//! drives it until shutdown.

pub mod builder;
pub mod core;
pub mod tasks;

pub use self::builder::ApplicationBuilder;
pub use self::core::Application;
