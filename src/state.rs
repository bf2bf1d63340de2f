use crate::services::{blob_store::LocalBlobStore, dispatcher::Dispatcher};
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Serves presigned downloads directly from disk.
    pub local_blobs: Arc<LocalBlobStore>,
}
