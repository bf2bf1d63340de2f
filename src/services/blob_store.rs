//! Blob store contract and the local-disk implementation.
//!
//! Payloads are written beneath `base_path/{shard}/{shard}/{key}` where the
//! shards come from MD5(key). A sidecar `{key}.content-type` file remembers
//! the MIME type supplied at upload.

use crate::{models::operation::DownloadLink, services::presign::UrlSigner};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::{
    future::Future,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration as StdDuration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_KEY_LEN: usize = 1024;
const CONTENT_TYPE_SUFFIX: &str = ".content-type";
/// Filesystem name limit minus room for the sidecar suffix.
const MAX_SEGMENT_LEN: usize = 255 - CONTENT_TYPE_SUFFIX.len();
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid blob key `{0}`")]
    InvalidKey(String),
    #[error("blob store timed out during {0}")]
    Timeout(&'static str),
    #[error("could not sign download link: {0}")]
    Presign(#[from] crate::services::presign::PresignError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobStoreError>;

/// Object storage addressed by opaque string keys.
///
/// Implementations must be safe for concurrent use; single-key operations are
/// expected to be atomic and bounded in time.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `key`, replacing anything already there.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> BlobResult<()>;

    /// Fetch the payload at `key`. Missing keys yield [`BlobStoreError::NotFound`].
    async fn get(&self, key: &str) -> BlobResult<Bytes>;

    /// Remove `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Produce a locator that grants retrieval of `key` for `ttl`.
    async fn presign(&self, key: &str, ttl: Duration) -> BlobResult<DownloadLink>;

    async fn health_check(&self) -> BlobResult<()>;
}

/// A blob opened for streaming.
#[derive(Debug)]
pub struct BlobReader {
    pub file: File,
    pub content_type: String,
    pub len: u64,
}

/// Local filesystem blob store with HMAC-signed download links.
#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    base_path: PathBuf,
    signer: UrlSigner,
    timeout: StdDuration,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>, signer: UrlSigner, timeout: StdDuration) -> Self {
        Self {
            base_path: base_path.into(),
            signer,
            timeout,
        }
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Open the payload at `key` for streaming out.
    pub async fn open(&self, key: &str) -> BlobResult<BlobReader> {
        ensure_key_safe(key)?;
        let path = self.blob_path(key);
        self.bounded("open", async {
            let file = File::open(&path)
                .await
                .map_err(|err| not_found_or_io(err, key))?;
            let len = file.metadata().await?.len();
            let content_type = read_content_type(&path).await?;
            Ok(BlobReader {
                file,
                content_type,
                len,
            })
        })
        .await
    }

    /// Two-level shard directories from MD5(key), as lowercase hex.
    fn shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> BlobResult<T>
    where
        F: Future<Output = BlobResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| BlobStoreError::Timeout(op))?
    }

    /// Remove empty directories from `start` upwards, stopping at `base_path`.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> BlobResult<()> {
        ensure_key_safe(key)?;
        let path = self.blob_path(key);
        self.bounded("put", async {
            let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
                BlobStoreError::Io(io::Error::other("blob path missing parent directory"))
            })?;
            fs::create_dir_all(&parent).await?;

            // The rename is the last fallible step, so an error leaves no payload behind.
            let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
            if let Err(err) = write_synced(&tmp_path, &bytes).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BlobStoreError::Io(err));
            }
            let sidecar = content_type_path(&path);
            if let Err(err) = fs::write(&sidecar, content_type.as_bytes()).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BlobStoreError::Io(err));
            }
            if let Err(err) = fs::rename(&tmp_path, &path).await {
                let _ = fs::remove_file(&tmp_path).await;
                let _ = fs::remove_file(&sidecar).await;
                return Err(BlobStoreError::Io(err));
            }
            debug!(key, size = bytes.len(), "stored blob");
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        ensure_key_safe(key)?;
        let path = self.blob_path(key);
        self.bounded("get", async {
            let data = fs::read(&path)
                .await
                .map_err(|err| not_found_or_io(err, key))?;
            Ok(Bytes::from(data))
        })
        .await
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        ensure_key_safe(key)?;
        let path = self.blob_path(key);
        self.bounded("delete", async {
            for target in [path.clone(), content_type_path(&path)] {
                match fs::remove_file(&target).await {
                    Ok(_) => debug!("removed {}", target.display()),
                    Err(err) if err.kind() == ErrorKind::NotFound => {
                        debug!("{} already missing", target.display());
                    }
                    Err(err) => return Err(BlobStoreError::Io(err)),
                }
            }
            if let Some(parent) = path.parent() {
                self.prune_empty_dirs(parent).await;
            }
            Ok(())
        })
        .await
    }

    async fn presign(&self, key: &str, ttl: Duration) -> BlobResult<DownloadLink> {
        ensure_key_safe(key)?;
        Ok(self.signer.sign(key, ttl)?)
    }

    /// Write/read/delete a probe file in the storage root.
    async fn health_check(&self) -> BlobResult<()> {
        self.bounded("health_check", async {
            fs::create_dir_all(&self.base_path).await?;
            let probe = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
            fs::write(&probe, b"readyz").await?;
            let read_back = fs::read(&probe).await;
            let _ = fs::remove_file(&probe).await;
            if read_back? != b"readyz" {
                return Err(BlobStoreError::Io(io::Error::other(
                    "probe file content mismatch",
                )));
            }
            Ok(())
        })
        .await
    }
}

/// Reject keys that could escape the storage root.
///
/// Keys must be relative, `/`-separated, with no empty, `.` or `..` segments,
/// no segment too long for a filename, and no backslashes or control bytes.
fn ensure_key_safe(key: &str) -> BlobResult<()> {
    let invalid = || BlobStoreError::InvalidKey(key.to_string());
    if key.is_empty() || key.len() > MAX_KEY_LEN || key.starts_with('/') {
        return Err(invalid());
    }
    if key
        .split('/')
        .any(|segment| {
            segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.len() > MAX_SEGMENT_LEN
        })
    {
        return Err(invalid());
    }
    if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
        return Err(invalid());
    }
    if key.ends_with(CONTENT_TYPE_SUFFIX) {
        return Err(invalid());
    }
    Ok(())
}

fn content_type_path(blob_path: &Path) -> PathBuf {
    let mut raw = blob_path.as_os_str().to_owned();
    raw.push(CONTENT_TYPE_SUFFIX);
    PathBuf::from(raw)
}

async fn read_content_type(blob_path: &Path) -> BlobResult<String> {
    match fs::read_to_string(content_type_path(blob_path)).await {
        Ok(ct) if !ct.trim().is_empty() => Ok(ct.trim().to_string()),
        Ok(_) => Ok(FALLBACK_CONTENT_TYPE.to_string()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(FALLBACK_CONTENT_TYPE.to_string()),
        Err(err) => Err(BlobStoreError::Io(err)),
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

fn not_found_or_io(err: io::Error, key: &str) -> BlobStoreError {
    if err.kind() == ErrorKind::NotFound {
        BlobStoreError::NotFound(key.to_string())
    } else {
        BlobStoreError::Io(err)
    }
}
