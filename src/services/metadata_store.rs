//! Metadata store capability: a flat mapping from record id to `Record`.

use crate::models::record::Record;
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Every record, in no particular order.
    async fn get_all(&self) -> MetadataResult<Vec<Record>>;

    async fn get(&self, id: &str) -> MetadataResult<Option<Record>>;

    /// Insert or replace the record stored under `record.id`.
    async fn set(&self, record: &Record) -> MetadataResult<()>;

    /// Remove a record; returns whether one existed.
    async fn delete(&self, id: &str) -> MetadataResult<bool>;

    /// Readiness probe.
    async fn check(&self) -> MetadataResult<()> {
        Ok(())
    }
}

/// In-memory metadata store for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryMetadataStore {
    records: Arc<RwLock<BTreeMap<String, Record>>>,
    fail_writes: Arc<RwLock<bool>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `set` fail, e.g. to observe orphan blobs.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut guard) = self.fail_writes.write() {
            *guard = fail;
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> MetadataError {
        MetadataError::Backend("lock poisoned".into())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get_all(&self) -> MetadataResult<Vec<Record>> {
        Ok(self
            .records
            .read()
            .map_err(|_| Self::poisoned())?
            .values()
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> MetadataResult<Option<Record>> {
        Ok(self
            .records
            .read()
            .map_err(|_| Self::poisoned())?
            .get(id)
            .cloned())
    }

    async fn set(&self, record: &Record) -> MetadataResult<()> {
        if self.fail_writes.read().map(|f| *f).unwrap_or(false) {
            return Err(MetadataError::Backend(format!(
                "write of `{}` refused",
                record.id
            )));
        }
        self.records
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> MetadataResult<bool> {
        Ok(self
            .records
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(id)
            .is_some())
    }
}
