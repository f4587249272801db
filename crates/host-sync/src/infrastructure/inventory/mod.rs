//! Inventory integration module.
//!
//! The main components are:
//! - [`InventoryClient`]: subscription to the upstream host watch stream
//! - [`InventoryWatcher`]: translates watch events into domain events
//! - [`decode_metadata`]: turns host metadata into a label set
//! - [`validate_host`]: rejects host messages that cannot be translated

pub mod client;
pub mod metadata;
pub mod types;
pub mod validate;
pub mod watcher;

pub use client::InventoryClient;
pub use client::InventoryOptions;
pub use client::NdjsonInventory;
pub use metadata::decode_metadata;
pub use metadata::encode_metadata;
pub use metadata::DecodeError;
pub use types::HostResource;
pub use types::InventoryError;
pub use types::WatchEvent;
pub use types::WatchEventKind;
pub use validate::validate_host;
pub use watcher::InventoryWatcher;
