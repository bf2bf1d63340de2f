//! Coordinates the blob store and the metadata store for every image
//! operation.
//!
//! Each call is a self-contained sequence over the two stores. Nothing here is
//! transactional: upload writes the blob first and compensates with a
//! best-effort blob delete if the metadata write fails; delete always attempts
//! the metadata removal even when the blob removal fails. No retries happen
//! here; storage errors are reported as retryable for the caller to decide.

use crate::{
    models::{
        image::{CustomMetadata, ImageRecord},
        operation::{
            DeleteConfirmation, DeleteRequest, ImageList, ImageView, ListRequest, Operation,
            Outcome, UploadRequest, ViewRequest,
        },
    },
    services::{
        blob_store::{BlobStore, BlobStoreError},
        filter::{self, ListFilter},
        identity::{self, DEFAULT_FILENAME},
        metadata_store::{MetadataStore, MetadataStoreError},
        ownership::{self, Authorization},
    },
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Which backing store failed.
#[derive(Debug, Error)]
pub enum StoreFailure {
    #[error("blob store: {0}")]
    Blob(#[from] BlobStoreError),
    #[error("metadata store: {0}")]
    Metadata(#[from] MetadataStoreError),
}

/// Error half of the canonical result.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Validation(String),
    #[error("image `{0}` not found")]
    NotFound(String),
    #[error("caller is not allowed to modify image `{0}`")]
    Forbidden(String),
    #[error("storage write failed: {0}")]
    StorageWrite(#[source] StoreFailure),
    #[error("storage read failed: {0}")]
    StorageRead(#[source] StoreFailure),
}

impl DispatchError {
    /// Storage failures may succeed on a later attempt, except a key the blob
    /// store refuses outright; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::StorageWrite(failure) | DispatchError::StorageRead(failure) => {
                !matches!(failure, StoreFailure::Blob(BlobStoreError::InvalidKey(_)))
            }
            _ => false,
        }
    }

    fn write(err: impl Into<StoreFailure>) -> Self {
        let err = err.into();
        error!(error = %err, "storage write failed");
        DispatchError::StorageWrite(err)
    }

    fn read(err: impl Into<StoreFailure>) -> Self {
        let err = err.into();
        error!(error = %err, "storage read failed");
        DispatchError::StorageRead(err)
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Stateless orchestrator over injected store clients.
#[derive(Clone)]
pub struct Dispatcher {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    link_ttl: Duration,
}

impl Dispatcher {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        link_ttl: Duration,
    ) -> Self {
        Self {
            blobs,
            metadata,
            link_ttl,
        }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Run one canonical operation to completion or to its first terminal failure.
    pub async fn dispatch(&self, operation: Operation) -> DispatchResult<Outcome> {
        match operation {
            Operation::Upload(req) => self.upload(req).await.map(Outcome::Uploaded),
            Operation::List(req) => self.list(req).await.map(Outcome::Listed),
            Operation::View(req) => self.view(req).await.map(Outcome::Viewed),
            Operation::Delete(req) => self.delete(req).await.map(Outcome::Deleted),
        }
    }

    #[tracing::instrument(skip_all, fields(owner_id = %req.owner_id, size = req.payload.len()))]
    pub async fn upload(&self, req: UploadRequest) -> DispatchResult<ImageRecord> {
        if req.owner_id.is_empty() {
            return Err(DispatchError::Validation("owner id is required".into()));
        }
        if req.payload.is_empty() {
            return Err(DispatchError::Validation("image data is empty".into()));
        }
        if req.content_type.is_empty() {
            return Err(DispatchError::Validation("content type is required".into()));
        }
        if let Some(metadata) = &req.custom_metadata {
            validate_custom_metadata(metadata)?;
        }

        let image_id = identity::new_identity();
        let filename = req
            .filename
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let storage_key = identity::derive_key(&req.owner_id, &image_id, Some(&filename));

        let record = ImageRecord {
            image_id: image_id.clone(),
            owner_id: req.owner_id,
            filename,
            storage_key,
            content_type: req.content_type,
            size_bytes: req.payload.len() as u64,
            custom_metadata: req.custom_metadata,
            created_at: Utc::now(),
        };

        match self
            .blobs
            .put(&record.storage_key, req.payload, &record.content_type)
            .await
        {
            Ok(()) => {}
            Err(BlobStoreError::InvalidKey(key)) => {
                return Err(DispatchError::Validation(format!(
                    "filename cannot be stored under key `{key}`"
                )));
            }
            Err(err @ BlobStoreError::Timeout(_)) => {
                // The write may still land after the deadline.
                self.compensate_orphaned_blob(&record.storage_key).await;
                return Err(DispatchError::write(err));
            }
            Err(err) => return Err(DispatchError::write(err)),
        }

        if let Err(err) = self.metadata.put(&image_id, &record).await {
            self.compensate_orphaned_blob(&record.storage_key).await;
            return Err(DispatchError::write(err));
        }

        info!(image_id = %record.image_id, key = %record.storage_key, "image uploaded");
        Ok(record)
    }

    /// Best-effort removal of a blob that has no record.
    async fn compensate_orphaned_blob(&self, storage_key: &str) {
        match self.blobs.delete(storage_key).await {
            Ok(()) => info!(key = storage_key, "removed orphaned blob"),
            Err(err) => warn!(key = storage_key, error = %err, "orphaned blob left behind"),
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn list(&self, req: ListRequest) -> DispatchResult<ImageList> {
        let predicates = ListFilter::from(&req);
        let limit = filter::effective_limit(req.limit);

        let records = self.metadata.scan(None).await.map_err(DispatchError::read)?;
        let images: Vec<ImageRecord> = filter::filter(records, &predicates, limit).collect();

        Ok(ImageList {
            count: images.len(),
            images,
        })
    }

    #[tracing::instrument(skip_all, fields(image_id = %req.image_id, link = req.want_download_link))]
    pub async fn view(&self, req: ViewRequest) -> DispatchResult<ImageView> {
        let record = self.load_record(&req.image_id).await?;

        if req.want_download_link {
            let link = self
                .blobs
                .presign(&record.storage_key, self.link_ttl)
                .await
                .map_err(DispatchError::read)?;
            return Ok(ImageView::Link { record, link });
        }

        match self.blobs.get(&record.storage_key).await {
            Ok(bytes) => Ok(ImageView::Content { record, bytes }),
            Err(BlobStoreError::NotFound(key)) => {
                warn!(image_id = %record.image_id, key = %key, "metadata present but blob missing");
                Err(DispatchError::NotFound(record.image_id))
            }
            Err(err) => Err(DispatchError::read(err)),
        }
    }

    #[tracing::instrument(skip_all, fields(image_id = %req.image_id))]
    pub async fn delete(&self, req: DeleteRequest) -> DispatchResult<DeleteConfirmation> {
        let record = self.load_record(&req.image_id).await?;

        if ownership::authorize(&record, req.caller_owner_id.as_deref()) == Authorization::Denied {
            return Err(DispatchError::Forbidden(record.image_id));
        }

        if let Err(err) = self.blobs.delete(&record.storage_key).await {
            warn!(key = %record.storage_key, error = %err, "blob delete failed; removing record anyway");
        }

        self.metadata
            .delete(&record.image_id)
            .await
            .map_err(DispatchError::write)?;

        info!("image deleted");
        Ok(DeleteConfirmation {
            image_id: record.image_id,
        })
    }

    async fn load_record(&self, image_id: &str) -> DispatchResult<ImageRecord> {
        if image_id.is_empty() {
            return Err(DispatchError::Validation("image id is required".into()));
        }
        self.metadata
            .get(image_id)
            .await
            .map_err(DispatchError::read)?
            .ok_or_else(|| DispatchError::NotFound(image_id.to_string()))
    }
}

/// Custom metadata values must be JSON scalars.
fn validate_custom_metadata(metadata: &CustomMetadata) -> DispatchResult<()> {
    match metadata
        .iter()
        .find(|(_, value)| value.is_array() || value.is_object())
    {
        Some((key, _)) => Err(DispatchError::Validation(format!(
            "metadata value for `{key}` must be a string, number, boolean or null"
        ))),
        None => Ok(()),
    }
}
