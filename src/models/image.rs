//! Represents an uploaded image and its descriptive metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Caller-supplied key/value annotations. Values are JSON scalars and opaque
/// to the service.
pub type CustomMetadata = BTreeMap<String, Value>;

/// A single image tracked by the service.
///
/// The record lives in the metadata store; the payload bytes live in the blob
/// store at `storage_key`. Every field is fixed at upload time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageRecord {
    /// Opaque unique identifier (UUID v4 string).
    pub image_id: String,

    /// Identifier of the caller that uploaded the image.
    pub owner_id: String,

    /// Display / original filename.
    pub filename: String,

    /// Location of the payload in the blob store.
    pub storage_key: String,

    /// MIME type supplied at upload.
    pub content_type: String,

    /// Payload length in bytes.
    pub size_bytes: u64,

    /// Optional caller annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_metadata: Option<CustomMetadata>,

    /// When the upload completed.
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    /// True when `owner_id` recorded on the image equals `caller`.
    pub fn is_owned_by(&self, caller: &str) -> bool {
        self.owner_id == caller
    }
}
