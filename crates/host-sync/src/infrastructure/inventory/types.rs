use core::error::Error;

use derive_more::Display;
use serde::Deserialize;
use serde::Serialize;

/// Kind of change reported by the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchEventKind {
    Created,
    Updated,
    Deleted,
    /// Any kind this version does not know about.
    #[serde(other)]
    Unknown,
}

/// Host resource as delivered by the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostResource {
    pub resource_id: String,
    pub tenant_id: String,
    pub name: String,
    /// JSON array of `{"key": .., "value": ..}` objects, possibly empty.
    pub metadata: String,
}

/// A single notification from the inventory watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    #[serde(default)]
    pub host: Option<HostResource>,
}

impl WatchEvent {
    pub const fn new(kind: WatchEventKind, host: HostResource) -> Self {
        Self {
            kind,
            host: Some(host),
        }
    }
}

/// Errors that can occur while talking to the inventory.
#[derive(Debug, Display)]
pub enum InventoryError {
    #[display("Failed to open inventory source: {message}")]
    SourceUnavailable { message: String },
    #[display("Inventory watch already started")]
    AlreadyWatching,
    #[display("Event sink closed while forwarding inventory events")]
    SinkClosed,
}

impl Error for InventoryError {}
