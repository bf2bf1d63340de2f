//! Canonical request and response shapes exchanged between the transport layer
//! and the dispatcher.

use super::image::{CustomMetadata, ImageRecord};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A fully parsed client request.
#[derive(Debug, Clone)]
pub enum Operation {
    Upload(UploadRequest),
    List(ListRequest),
    View(ViewRequest),
    Delete(DeleteRequest),
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner_id: String,
    pub content_type: String,
    pub payload: Bytes,
    pub filename: Option<String>,
    pub custom_metadata: Option<CustomMetadata>,
}

/// Predicates and bound for a list. Empty strings count as "not supplied".
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub owner_id: Option<String>,
    pub content_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ViewRequest {
    pub image_id: String,
    /// Return a time-limited locator instead of the payload bytes.
    pub want_download_link: bool,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub image_id: String,
    pub caller_owner_id: Option<String>,
}

/// Successful result of a dispatched [`Operation`].
#[derive(Debug)]
pub enum Outcome {
    Uploaded(ImageRecord),
    Listed(ImageList),
    Viewed(ImageView),
    Deleted(DeleteConfirmation),
}

#[derive(Debug, Serialize)]
pub struct ImageList {
    pub count: usize,
    pub images: Vec<ImageRecord>,
}

#[derive(Debug)]
pub enum ImageView {
    Content { record: ImageRecord, bytes: Bytes },
    Link { record: ImageRecord, link: DownloadLink },
}

/// Opaque pre-authorized locator for a blob.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DownloadLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeleteConfirmation {
    pub image_id: String,
}
