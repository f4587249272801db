//! Conversion between the inventory's metadata string and a [`LabelSet`].

use core::error::Error;

use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::domain::events::LabelSet;

/// Errors that can occur while decoding host metadata.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[display("Malformed host metadata: {message}")]
    MalformedMetadata { message: String },
}

impl Error for DecodeError {}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataEntry {
    key: String,
    value: String,
}

/// Decode the metadata string of a host into labels.
///
/// An empty string yields an empty set. Duplicate keys keep the last value and
/// are logged, since they point at a producer bug.
///
/// # Errors
///
/// - [`DecodeError::MalformedMetadata`] if the input is not a JSON array of
///   `{"key": string, "value": string}` objects
pub fn decode_metadata(metadata: &str) -> Result<LabelSet, Report<DecodeError>> {
    if metadata.is_empty() {
        return Ok(LabelSet::new());
    }

    let entries: Vec<MetadataEntry> =
        serde_json::from_str(metadata).change_context(DecodeError::MalformedMetadata {
            message: format!("expected a JSON array of key/value objects: {metadata}"),
        })?;

    let mut labels = LabelSet::new();
    for MetadataEntry { key, value } in entries {
        if let Some(previous) = labels.insert(key.clone(), value) {
            warn!(key = %key, previous = %previous, "Duplicate metadata key, keeping last value");
        }
    }
    Ok(labels)
}

/// Encode labels into the metadata string form understood by [`decode_metadata`].
pub fn encode_metadata(labels: &LabelSet) -> String {
    let entries: Vec<MetadataEntry> = labels
        .iter()
        .map(|(key, value)| MetadataEntry {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();
    // a Vec of string pairs always serializes
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
}
