//! In-memory store fakes with switchable failures.

use crate::{
    models::{image::ImageRecord, operation::DownloadLink},
    services::{
        blob_store::{BlobResult, BlobStore, BlobStoreError},
        metadata_store::{MetadataResult, MetadataStore, MetadataStoreError},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use std::{
    collections::HashMap,
    io,
    sync::{
        RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

fn injected(op: &str) -> io::Error {
    io::Error::other(format!("injected {op} failure"))
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, (Bytes, String)>>,
    pub fail_put: AtomicBool,
    pub fail_get: AtomicBool,
    pub fail_delete: AtomicBool,
    pub time_out: AtomicBool,
    /// Store the payload, then report a timeout.
    pub time_out_after_put: AtomicBool,
    /// Refuse every key as invalid.
    pub reject_keys: AtomicBool,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().expect("lock poisoned").contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        let map = self.blobs.read().expect("lock poisoned");
        map.get(key).map(|(_, ct)| ct.clone())
    }

    /// Drop a blob behind the caller's back to simulate divergence.
    pub fn remove_silently(&self, key: &str) {
        self.blobs.write().expect("lock poisoned").remove(key);
    }

    fn check(&self, flag: &AtomicBool, op: &'static str) -> BlobResult<()> {
        if self.time_out.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Timeout(op));
        }
        if flag.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Io(injected(op)));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> BlobResult<()> {
        if self.reject_keys.load(Ordering::SeqCst) {
            return Err(BlobStoreError::InvalidKey(key.to_string()));
        }
        self.check(&self.fail_put, "put")?;
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), (bytes, content_type.to_string()));
        if self.time_out_after_put.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Timeout("put"));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        self.check(&self.fail_get, "get")?;
        let map = self.blobs.read().expect("lock poisoned");
        map.get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.check(&self.fail_delete, "delete")?;
        self.blobs.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> BlobResult<DownloadLink> {
        let expires_at = Utc::now() + ttl;
        Ok(DownloadLink {
            url: format!("memory://{key}?expires={}", expires_at.timestamp()),
            expires_at,
        })
    }

    async fn health_check(&self) -> BlobResult<()> {
        self.check(&self.fail_get, "health_check")
    }
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<Vec<ImageRecord>>,
    pub fail_put: AtomicBool,
    pub fail_read: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    fn check(&self, flag: &AtomicBool) -> MetadataResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(MetadataStoreError::Timeout);
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn put(&self, image_id: &str, record: &ImageRecord) -> MetadataResult<()> {
        self.check(&self.fail_put)?;
        let mut records = self.records.write().expect("lock poisoned");
        match records.iter_mut().find(|r| r.image_id == image_id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn get(&self, image_id: &str) -> MetadataResult<Option<ImageRecord>> {
        self.check(&self.fail_read)?;
        let records = self.records.read().expect("lock poisoned");
        Ok(records.iter().find(|r| r.image_id == image_id).cloned())
    }

    async fn delete(&self, image_id: &str) -> MetadataResult<()> {
        self.check(&self.fail_delete)?;
        self.records
            .write()
            .expect("lock poisoned")
            .retain(|r| r.image_id != image_id);
        Ok(())
    }

    async fn scan(&self, limit: Option<usize>) -> MetadataResult<Vec<ImageRecord>> {
        self.check(&self.fail_read)?;
        let records = self.records.read().expect("lock poisoned");
        Ok(records
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.check(&self.fail_read)
    }
}
