//! src/services/local_object_store.rs
//!
//! LocalObjectStore: disk-backed object store for PDF payloads. Blobs are
//! sharded beneath `base_path/{shard}/{shard}/{key}` and links to them are
//! served by the catalog's own `/blobs` route.

use crate::services::{
    object_store::{BlobReader, ObjectStore, ObjectStoreError, ObjectStoreResult, PutReceipt},
    url_signer::UrlSigner,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 2048;
const TMP_PREFIX: &str = ".tmp-";
const PROBE_PREFIX: &str = ".readyz-";

#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory on disk where blob payloads are stored.
    pub base_path: PathBuf,

    signer: UrlSigner,
}

impl LocalObjectStore {
    /// Create a store rooted at `base_path`; `signer` mints links to blobs.
    pub fn new(base_path: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            base_path: base_path.into(),
            signer,
        }
    }

    /// Reject keys that could escape `base_path` or that the filesystem
    /// cannot represent.
    fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
        let invalid = || ObjectStoreError::InvalidKey(key.to_string());
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN || key.starts_with('/') {
            return Err(invalid());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid());
        }
        Ok(())
    }

    /// Two-level shard identifiers for a key: the first two bytes of MD5(key)
    /// as lowercase hex.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Fully-qualified payload path; parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Remove empty directories from `start` up to, but excluding, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    /// Depth-first walk collecting the keys stored under one shard pair.
    async fn collect_keys(shard_root: &Path, keys: &mut Vec<String>) -> io::Result<()> {
        let mut pending = vec![shard_root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if is_temp_file(&entry.file_name().to_string_lossy()) {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(shard_root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }
        Ok(())
    }

    async fn read_dir_names(dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                out.push(entry.path());
            }
        }
        Ok(out)
    }
}

/// In-flight writes are named `.tmp-<uuid>`; anything else is a stored key.
fn is_temp_file(name: &str) -> bool {
    name.strip_prefix(TMP_PREFIX).is_some_and(|rest| Uuid::parse_str(rest).is_ok())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    /// Write the payload to a temp file, fsync it, then rename it into place.
    /// An existing blob under the same key is replaced.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> ObjectStoreResult<PutReceipt> {
        Self::ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ObjectStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!("{TMP_PREFIX}{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        if let Err(err) = file.write_all(&data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        }

        let receipt = PutReceipt {
            size_bytes: data.len() as i64,
            etag: format!("{:x}", md5::compute(&data)),
        };
        debug!(
            key,
            content_type,
            etag = %receipt.etag,
            "stored blob at {}",
            file_path.display()
        );
        Ok(receipt)
    }

    /// Returns NotFound if the payload file is missing.
    async fn get(&self, key: &str) -> ObjectStoreResult<BlobReader> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Io(err)
            }
        })?;
        let size_bytes = file.metadata().await?.len();

        Ok(BlobReader {
            size_bytes,
            reader: Box::new(file),
        })
    }

    async fn delete(&self, key: &str) -> ObjectStoreResult<()> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(ObjectStoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> ObjectStoreResult<bool> {
        Self::ensure_key_safe(key)?;
        match fs::metadata(self.object_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }

    /// Walks `base/{shard}/{shard}/...`; the path below the shard pair is the key.
    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for shard_a in Self::read_dir_names(&self.base_path).await? {
            for shard_b in Self::read_dir_names(&shard_a).await? {
                Self::collect_keys(&shard_b, &mut keys).await?;
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> ObjectStoreResult<String> {
        Self::ensure_key_safe(key)?;
        self.signer
            .sign_url(key, ttl)
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))
    }

    async fn public_url(&self, key: &str) -> ObjectStoreResult<String> {
        Self::ensure_key_safe(key)?;
        Ok(self.signer.blob_url(key))
    }

    /// Best-effort write/read/delete of a probe file under `base_path`.
    async fn check(&self) -> ObjectStoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let probe = self
            .base_path
            .join(format!("{PROBE_PREFIX}{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let bytes = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;
        if bytes? != b"readyz" {
            return Err(ObjectStoreError::Backend("probe content mismatch".into()));
        }
        Ok(())
    }
}
