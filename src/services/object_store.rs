//! Object store capability used by the catalog for PDF payloads.
//!
//! Keys are path-like (`district/block/.../id___file.pdf` or a bare filename).
//! Implementations must be safe to share between requests; each call is
//! independently atomic and nothing coordinates calls across keys.

use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    io,
    sync::{Arc, RwLock},
    time::Duration,
};
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid blob key `{0}`")]
    InvalidKey(String),
    #[error("{0} is not supported by this object store")]
    Unsupported(&'static str),
    #[error("object store backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Result of a successful `put`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutReceipt {
    pub size_bytes: i64,
    /// Hex MD5 of the payload.
    pub etag: String,
}

/// Open handle on a blob, ready to be streamed into a response.
pub struct BlobReader {
    pub size_bytes: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReader")
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing blob.
    async fn put(&self, key: &str, data: Bytes, content_type: &str)
    -> ObjectStoreResult<PutReceipt>;

    /// Open a blob for reading. `NotFound` when the key has no blob.
    async fn get(&self, key: &str) -> ObjectStoreResult<BlobReader>;

    /// Remove a blob. Removing a missing blob is not an error.
    async fn delete(&self, key: &str) -> ObjectStoreResult<()>;

    async fn exists(&self, key: &str) -> ObjectStoreResult<bool>;

    /// Every key currently holding a blob.
    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>>;

    /// Time-bounded link to the blob.
    async fn signed_url(&self, key: &str, ttl: Duration) -> ObjectStoreResult<String>;

    /// Unauthenticated link to the blob.
    async fn public_url(&self, key: &str) -> ObjectStoreResult<String>;

    /// Readiness probe.
    async fn check(&self) -> ObjectStoreResult<()> {
        Ok(())
    }
}

/// Failure switches for `MemoryObjectStore`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryFaults {
    pub fail_puts: bool,
    pub fail_reads: bool,
    pub fail_deletes: bool,
    pub fail_urls: bool,
}

#[derive(Clone, Debug)]
struct StoredBlob {
    data: Bytes,
    content_type: String,
}

/// In-memory object store for tests and throwaway runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryObjectStore {
    blobs: Arc<RwLock<HashMap<String, StoredBlob>>>,
    faults: Arc<RwLock<MemoryFaults>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active failure switches.
    pub fn set_faults(&self, faults: MemoryFaults) {
        if let Ok(mut guard) = self.faults.write() {
            *guard = faults;
        }
    }

    /// Raw bytes and content type of a stored blob.
    pub fn blob(&self, key: &str) -> Option<(Bytes, String)> {
        self.blobs
            .read()
            .ok()?
            .get(key)
            .map(|b| (b.data.clone(), b.content_type.clone()))
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop a blob behind the catalog's back, leaving any record dangling.
    pub fn remove_raw(&self, key: &str) {
        if let Ok(mut blobs) = self.blobs.write() {
            blobs.remove(key);
        }
    }

    fn faults(&self) -> MemoryFaults {
        self.faults.read().map(|f| *f).unwrap_or_default()
    }

    fn poisoned() -> ObjectStoreError {
        ObjectStoreError::Backend("lock poisoned".into())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> ObjectStoreResult<PutReceipt> {
        if self.faults().fail_puts {
            return Err(ObjectStoreError::Backend(format!("put `{key}` refused")));
        }
        let receipt = PutReceipt {
            size_bytes: data.len() as i64,
            etag: format!("{:x}", md5::compute(&data)),
        };
        self.blobs.write().map_err(|_| Self::poisoned())?.insert(
            key.to_string(),
            StoredBlob {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(receipt)
    }

    async fn get(&self, key: &str) -> ObjectStoreResult<BlobReader> {
        if self.faults().fail_reads {
            return Err(ObjectStoreError::Backend(format!("read `{key}` refused")));
        }
        let data = self
            .blobs
            .read()
            .map_err(|_| Self::poisoned())?
            .get(key)
            .map(|b| b.data.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
        Ok(BlobReader {
            size_bytes: data.len() as u64,
            reader: Box::new(io::Cursor::new(data)),
        })
    }

    async fn delete(&self, key: &str) -> ObjectStoreResult<()> {
        if self.faults().fail_deletes {
            return Err(ObjectStoreError::Backend(format!("delete `{key}` refused")));
        }
        self.blobs.write().map_err(|_| Self::poisoned())?.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> ObjectStoreResult<bool> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| Self::poisoned())?
            .contains_key(key))
    }

    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .blobs
            .read()
            .map_err(|_| Self::poisoned())?
            .keys()
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> ObjectStoreResult<String> {
        if self.faults().fail_urls {
            return Err(ObjectStoreError::Backend(format!("signing `{key}` refused")));
        }
        Ok(format!("memory://{key}?ttl={}", ttl.as_secs()))
    }

    async fn public_url(&self, key: &str) -> ObjectStoreResult<String> {
        if self.faults().fail_urls {
            return Err(ObjectStoreError::Backend(format!("publishing `{key}` refused")));
        }
        Ok(format!("memory://{key}"))
    }
}
