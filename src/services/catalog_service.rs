//! src/services/catalog_service.rs
//!
//! CatalogService: keeps PDF blobs in an `ObjectStore` and their descriptive
//! records in a `MetadataStore`, and exposes list/search, create, retrieve,
//! delete and audit over the pair.
//!
//! Blob and record are written and removed in two independent steps with no
//! transaction spanning both stores. A failure between the steps leaves an
//! orphan; `audit` reports them, nothing repairs them. Concurrent calls on the
//! same id are not coordinated (last write wins).

use crate::{
    models::{
        record::{Record, Tags},
        upload::{FormFields, Upload},
    },
    services::{
        metadata_store::{MetadataError, MetadataStore},
        object_store::{BlobReader, ObjectStore, ObjectStoreError},
    },
};
use chrono::Local;
use clap::ValueEnum;
use serde::Serialize;
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const DEFAULT_UPLOADER: &str = "anonymous";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const KEY_ID_SEPARATOR: &str = "___";
/// Upper bound for one `/`-separated key segment, below the usual 255-byte
/// filename limit even with the `{id}___` prefix on the leaf.
const MAX_KEY_SEGMENT_BYTES: usize = 200;
/// Longest extension kept intact when a leaf segment is shortened.
const MAX_KEPT_EXTENSION_BYTES: usize = 16;

/// How record ids and blob keys are derived from an upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyLayout {
    /// id and key are the filename; re-uploads overwrite.
    Flat,
    /// id is a fresh UUID; key is `<fields>/<id>___<filename>`.
    Hierarchical,
}

/// Which descriptive fields an upload must carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    /// A single required `title`.
    Titled,
    /// Required `district`, `block`, `gp`, `polling_station`, `year`.
    Tagged,
}

/// Which link, if any, is cached on the record at upload time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlPolicy {
    None,
    Signed,
    Public,
}

/// How `retrieve` hands content back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Stream,
    Redirect,
}

#[derive(Clone, Debug)]
pub struct CatalogSettings {
    pub layout: KeyLayout,
    pub schema: Schema,
    pub url_policy: UrlPolicy,
    pub delivery: Delivery,
    pub signed_url_ttl: Duration,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            layout: KeyLayout::Hierarchical,
            schema: Schema::Titled,
            url_policy: UrlPolicy::None,
            delivery: Delivery::Stream,
            signed_url_ttl: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),
    #[error("record `{0}` not found")]
    NotFound(String),
    #[error("{0}")]
    Server(String),
    #[error(transparent)]
    Object(#[from] ObjectStoreError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// A non-essential step that failed while the operation itself completed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BestEffortFailure {
    UrlGeneration { key: String, reason: String },
    BlobDelete { key: String, reason: String },
}

/// Outcome of an operation whose best-effort steps may have failed.
#[derive(Clone, Debug)]
pub struct Completed<T> {
    pub value: T,
    pub warnings: Vec<BestEffortFailure>,
}

impl<T> Completed<T> {
    fn new(value: T, warnings: Vec<BestEffortFailure>) -> Self {
        Self { value, warnings }
    }

    /// True when some best-effort step failed.
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Per-file results of a multi-file upload.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub created: Vec<Completed<Record>>,
    /// Filenames rejected for not being PDFs.
    pub skipped: Vec<String>,
    /// Filename and error of each file whose essential steps failed.
    pub failed: Vec<(String, CatalogError)>,
}

/// What `retrieve` resolved to.
#[derive(Debug)]
pub enum Retrieval {
    Stream { record: Record, blob: BlobReader },
    Redirect { record: Record, url: String },
}

/// Divergence between the two stores.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct AuditReport {
    pub records: usize,
    pub blobs: usize,
    /// Ids of records whose blob is missing.
    pub dangling_records: Vec<String>,
    /// Blob keys no record references.
    pub orphan_blobs: Vec<String>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.dangling_records.is_empty() && self.orphan_blobs.is_empty()
    }
}

/// Validated descriptive fields of one upload request.
#[derive(Clone, Debug)]
struct Descriptors {
    title: Option<String>,
    tags: Option<Tags>,
    uploader: String,
}

#[derive(Clone)]
pub struct CatalogService {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    settings: CatalogSettings,
}

impl CatalogService {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        settings: CatalogSettings,
    ) -> Self {
        Self {
            objects,
            metadata,
            settings,
        }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    /// Records whose title or tags contain `query` (case-insensitive), in
    /// listing order. An empty or missing query returns everything.
    ///
    /// Loads the whole collection; there is no index and no pagination.
    pub async fn list_or_search(&self, query: Option<&str>) -> CatalogResult<Vec<Record>> {
        let needle = query.unwrap_or_default().to_lowercase();
        let mut records: Vec<Record> = self
            .metadata
            .get_all()
            .await?
            .into_iter()
            .filter(|record| record.matches(&needle))
            .collect();
        records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(records)
    }

    /// Catalogue a single PDF.
    pub async fn create(
        &self,
        fields: &FormFields,
        upload: Upload,
    ) -> CatalogResult<Completed<Record>> {
        let descriptors = self.validate_fields(fields)?;
        if !upload.is_pdf() {
            return Err(CatalogError::Validation(format!(
                "`{}` is not a PDF",
                upload.filename
            )));
        }
        self.store_one(&descriptors, upload).await
    }

    /// Catalogue every PDF of a multi-file request.
    ///
    /// Field validation happens before any write. Non-PDF files are skipped;
    /// when no PDF is left the whole request is a validation error. Each
    /// remaining file succeeds or fails on its own.
    pub async fn create_batch(
        &self,
        fields: &FormFields,
        uploads: Vec<Upload>,
    ) -> CatalogResult<BatchOutcome> {
        let descriptors = self.validate_fields(fields)?;
        if uploads.is_empty() {
            return Err(CatalogError::Validation("no file uploaded".into()));
        }

        let mut outcome = BatchOutcome::default();
        let (pdfs, others): (Vec<Upload>, Vec<Upload>) =
            uploads.into_iter().partition(Upload::is_pdf);
        for upload in others {
            debug!(filename = %upload.filename, "skipping non-PDF upload");
            outcome.skipped.push(upload.filename);
        }
        if pdfs.is_empty() {
            return Err(CatalogError::Validation(format!(
                "no PDF among uploaded files: {}",
                outcome.skipped.join(", ")
            )));
        }

        for upload in pdfs {
            let filename = upload.filename.clone();
            match self.store_one(&descriptors, upload).await {
                Ok(created) => outcome.created.push(created),
                Err(err) => {
                    warn!(%filename, error = %err, "upload failed");
                    outcome.failed.push((filename, err));
                }
            }
        }
        Ok(outcome)
    }

    /// Resolve a record to its content.
    pub async fn retrieve(&self, id: &str) -> CatalogResult<Retrieval> {
        let record = self.find(id).await?;

        if self.settings.delivery == Delivery::Redirect {
            if let Some(url) = record.public_url.clone() {
                match self.objects.exists(&record.storage_path).await {
                    Ok(true) => return Ok(Retrieval::Redirect { record, url }),
                    Ok(false) => return Err(CatalogError::NotFound(id.to_string())),
                    Err(err) => {
                        warn!(id, error = %err, "existence check failed, redirecting anyway");
                        return Ok(Retrieval::Redirect { record, url });
                    }
                }
            }
        }

        match self.objects.get(&record.storage_path).await {
            Ok(blob) => Ok(Retrieval::Stream { record, blob }),
            Err(ObjectStoreError::NotFound(key)) => {
                debug!(id, %key, "record points at a missing blob");
                Err(CatalogError::NotFound(id.to_string()))
            }
            Err(err) => match record.public_url.clone() {
                Some(url) => {
                    warn!(id, error = %err, "blob read failed, falling back to cached url");
                    Ok(Retrieval::Redirect { record, url })
                }
                None => Err(CatalogError::Server(format!(
                    "reading `{}` failed: {err}",
                    record.storage_path
                ))),
            },
        }
    }

    /// Remove a record and its blob, blob first.
    ///
    /// Blob removal is best-effort; the record is removed regardless.
    pub async fn delete(&self, id: &str) -> CatalogResult<Completed<Record>> {
        let record = self.find(id).await?;
        let key = record.storage_path.clone();

        let mut warnings = Vec::new();
        let blob_result = match self.objects.exists(&key).await {
            Ok(true) => self.objects.delete(&key).await,
            Ok(false) => {
                debug!(id, %key, "blob already gone");
                Ok(())
            }
            Err(err) => Err(err),
        };
        if let Err(err) = blob_result {
            warn!(id, %key, error = %err, "blob delete failed, removing record anyway");
            warnings.push(BestEffortFailure::BlobDelete {
                key: key.clone(),
                reason: err.to_string(),
            });
        }

        if !self.metadata.delete(id).await? {
            debug!(id, "record vanished before delete");
        }
        info!(id, %key, "deleted record");
        Ok(Completed::new(record, warnings))
    }

    /// Compare both stores and report orphans in either direction.
    pub async fn audit(&self) -> CatalogResult<AuditReport> {
        let records = self.metadata.get_all().await?;
        let keys: BTreeSet<String> = self.objects.list_keys().await?.into_iter().collect();
        let referenced: BTreeSet<&str> = records.iter().map(|r| r.storage_path.as_str()).collect();

        let mut dangling_records: Vec<String> = records
            .iter()
            .filter(|r| !keys.contains(&r.storage_path))
            .map(|r| r.id.clone())
            .collect();
        dangling_records.sort();

        let orphan_blobs = keys
            .iter()
            .filter(|k| !referenced.contains(k.as_str()))
            .cloned()
            .collect();

        Ok(AuditReport {
            records: records.len(),
            blobs: keys.len(),
            dangling_records,
            orphan_blobs,
        })
    }

    /// Readiness of both stores, as `(metadata, objects)` errors.
    pub async fn check(&self) -> (Option<String>, Option<String>) {
        let metadata = self.metadata.check().await.err().map(|e| e.to_string());
        let objects = self.objects.check().await.err().map(|e| e.to_string());
        (metadata, objects)
    }

    async fn find(&self, id: &str) -> CatalogResult<Record> {
        self.metadata
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    fn validate_fields(&self, fields: &FormFields) -> CatalogResult<Descriptors> {
        let field = |name: &str| {
            fields
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let required = |name: &str| {
            field(name).ok_or_else(|| CatalogError::Validation(format!("missing field `{name}`")))
        };

        let (title, tags) = match self.settings.schema {
            Schema::Titled => (Some(required("title")?), None),
            Schema::Tagged => {
                let tags = Tags {
                    district: required("district")?,
                    block: required("block")?,
                    gp: required("gp")?,
                    polling_station: required("polling_station")?,
                    year: required("year")?,
                };
                (field("title"), Some(tags))
            }
        };

        Ok(Descriptors {
            title,
            tags,
            uploader: field("uploader").unwrap_or_else(|| DEFAULT_UPLOADER.to_string()),
        })
    }

    /// Derive `(id, key)` for a new upload.
    fn allocate(&self, descriptors: &Descriptors, filename: &str) -> (String, String) {
        match self.settings.layout {
            KeyLayout::Flat => (filename.to_string(), filename.to_string()),
            KeyLayout::Hierarchical => {
                let id = Uuid::new_v4().simple().to_string();
                let mut segments: Vec<String> = match (&descriptors.tags, &descriptors.title) {
                    (Some(tags), _) => tags.values().iter().map(|v| key_segment(v)).collect(),
                    (None, Some(title)) => vec![key_segment(title)],
                    (None, None) => Vec::new(),
                };
                segments.push(format!("{id}{KEY_ID_SEPARATOR}{}", leaf_segment(filename)));
                (id, segments.join("/"))
            }
        }
    }

    /// Put the blob, try for a URL, then write the record.
    async fn store_one(
        &self,
        descriptors: &Descriptors,
        upload: Upload,
    ) -> CatalogResult<Completed<Record>> {
        let filename = upload.base_name().ok_or_else(|| {
            CatalogError::Validation(format!("unusable filename `{}`", upload.filename))
        })?;
        let (id, key) = self.allocate(descriptors, &filename);

        let receipt = self
            .objects
            .put(&key, upload.content, PDF_CONTENT_TYPE)
            .await?;

        let mut warnings = Vec::new();
        let public_url = match self.link_for(&key).await {
            Ok(url) => url,
            Err(err) => {
                warn!(%key, error = %err, "url generation failed, leaving it empty");
                warnings.push(BestEffortFailure::UrlGeneration {
                    key: key.clone(),
                    reason: err.to_string(),
                });
                None
            }
        };

        let record = Record {
            id,
            title: descriptors.title.clone().unwrap_or_else(|| filename.clone()),
            tags: descriptors.tags.clone(),
            uploader: descriptors.uploader.clone(),
            filename,
            storage_path: key,
            size_bytes: receipt.size_bytes,
            uploaded_at: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            public_url,
        };

        if let Err(err) = self.metadata.set(&record).await {
            warn!(
                key = %record.storage_path,
                error = %err,
                "record write failed, blob left without metadata"
            );
            return Err(err.into());
        }

        info!(id = %record.id, key = %record.storage_path, etag = %receipt.etag, "catalogued upload");
        Ok(Completed::new(record, warnings))
    }

    async fn link_for(&self, key: &str) -> Result<Option<String>, ObjectStoreError> {
        match self.settings.url_policy {
            UrlPolicy::None => Ok(None),
            UrlPolicy::Signed => self
                .objects
                .signed_url(key, self.settings.signed_url_ttl)
                .await
                .map(Some),
            UrlPolicy::Public => self.objects.public_url(key).await.map(Some),
        }
    }
}

/// Turn a free-text field into one safe key segment.
fn key_segment(value: &str) -> String {
    let segment: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match segment.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => truncate_at_char_boundary(&segment, MAX_KEY_SEGMENT_BYTES).to_string(),
    }
}

/// Like `key_segment`, but a shortened filename keeps its extension.
fn leaf_segment(filename: &str) -> String {
    let segment = key_segment(filename);
    let full = filename.trim();
    if full.len() <= MAX_KEY_SEGMENT_BYTES {
        return segment;
    }
    match full.rfind('.') {
        Some(dot) if full.len() - dot <= MAX_KEPT_EXTENSION_BYTES && dot > 0 => {
            let extension = key_segment(&full[dot..]);
            let stem = key_segment(&full[..dot]);
            let stem = truncate_at_char_boundary(&stem, MAX_KEY_SEGMENT_BYTES - extension.len());
            format!("{stem}{extension}")
        }
        _ => segment,
    }
}

fn truncate_at_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        metadata_store::MemoryMetadataStore,
        object_store::{MemoryFaults, MemoryObjectStore},
    };
    use tokio::io::AsyncReadExt;

    const PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n%%EOF";

    struct Harness {
        objects: MemoryObjectStore,
        metadata: MemoryMetadataStore,
        catalog: CatalogService,
    }

    fn harness(settings: CatalogSettings) -> Harness {
        let objects = MemoryObjectStore::new();
        let metadata = MemoryMetadataStore::new();
        let catalog = CatalogService::new(
            Arc::new(objects.clone()),
            Arc::new(metadata.clone()),
            settings,
        );
        Harness {
            objects,
            metadata,
            catalog,
        }
    }

    fn flat() -> CatalogSettings {
        CatalogSettings {
            layout: KeyLayout::Flat,
            url_policy: UrlPolicy::Signed,
            delivery: Delivery::Redirect,
            ..Default::default()
        }
    }

    fn tagged() -> CatalogSettings {
        CatalogSettings {
            schema: Schema::Tagged,
            url_policy: UrlPolicy::Public,
            ..Default::default()
        }
    }

    fn titled(title: &str) -> FormFields {
        FormFields::from([("title".to_string(), title.to_string())])
    }

    fn tag_fields(district: &str, year: &str) -> FormFields {
        FormFields::from([
            ("district".to_string(), district.to_string()),
            ("block".to_string(), "Balianta".to_string()),
            ("gp".to_string(), "Benupur".to_string()),
            ("polling_station".to_string(), "PS 12".to_string()),
            ("year".to_string(), year.to_string()),
            ("uploader".to_string(), "clerk".to_string()),
        ])
    }

    async fn read_all(retrieval: Retrieval) -> Vec<u8> {
        match retrieval {
            Retrieval::Stream { mut blob, .. } => {
                let mut out = Vec::new();
                blob.reader.read_to_end(&mut out).await.unwrap();
                out
            }
            Retrieval::Redirect { url, .. } => panic!("expected stream, got redirect to {url}"),
        }
    }

    #[tokio::test]
    async fn minutes_scenario() {
        let h = harness(CatalogSettings::default());
        let created = h
            .catalog
            .create(&titled("Minutes"), Upload::new("minutes.pdf", PDF))
            .await
            .unwrap();
        assert!(!created.is_partial());
        let record = created.value;
        assert_eq!(record.filename, "minutes.pdf");
        assert_eq!(record.title, "Minutes");
        assert_eq!(record.uploader, DEFAULT_UPLOADER);
        assert_eq!(record.size_bytes, PDF.len() as i64);

        let found = h.catalog.list_or_search(Some("min")).await.unwrap();
        assert_eq!(found, vec![record.clone()]);

        let bytes = read_all(h.catalog.retrieve(&record.id).await.unwrap()).await;
        assert_eq!(bytes, PDF);

        h.catalog.delete(&record.id).await.unwrap();
        assert!(h.catalog.list_or_search(Some("min")).await.unwrap().is_empty());
        assert!(h.objects.is_empty());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_empty_query_lists_all() {
        let h = harness(CatalogSettings::default());
        for title in ["Budget 2024", "Annual REPORT", "report draft"] {
            h.catalog
                .create(&titled(title), Upload::new("f.pdf", PDF))
                .await
                .unwrap();
        }

        assert_eq!(h.catalog.list_or_search(None).await.unwrap().len(), 3);
        assert_eq!(h.catalog.list_or_search(Some("")).await.unwrap().len(), 3);

        let titles: Vec<String> = h
            .catalog
            .list_or_search(Some("RePoRt"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["Annual REPORT", "report draft"]);
    }

    #[tokio::test]
    async fn tagged_listing_is_grouped_by_tags() {
        let h = harness(tagged());
        h.catalog
            .create(&tag_fields("Puri", "2024"), Upload::new("b.pdf", PDF))
            .await
            .unwrap();
        h.catalog
            .create(&tag_fields("Khordha", "2024"), Upload::new("a.pdf", PDF))
            .await
            .unwrap();
        h.catalog
            .create(&tag_fields("Khordha", "2019"), Upload::new("c.pdf", PDF))
            .await
            .unwrap();

        let listed = h.catalog.list_or_search(None).await.unwrap();
        let order: Vec<(&str, &str)> = listed
            .iter()
            .map(|r| {
                let tags = r.tags.as_ref().unwrap();
                (tags.district.as_str(), tags.year.as_str())
            })
            .collect();
        assert_eq!(
            order,
            vec![("Khordha", "2019"), ("Khordha", "2024"), ("Puri", "2024")]
        );

        let puri = h.catalog.list_or_search(Some("pur")).await.unwrap();
        assert_eq!(puri.len(), 1);
    }

    #[tokio::test]
    async fn hierarchical_key_embeds_fields_and_id() {
        let h = harness(tagged());
        let record = h
            .catalog
            .create(&tag_fields("Khordha", "2024"), Upload::new("scans/roll.pdf", PDF))
            .await
            .unwrap()
            .value;

        assert_eq!(record.id.len(), 32);
        assert_eq!(
            record.storage_path,
            format!("Khordha/Balianta/Benupur/PS 12/2024/{}___roll.pdf", record.id)
        );
        assert_eq!(record.title, "roll.pdf");
        assert_eq!(record.uploader, "clerk");
        assert_eq!(
            record.public_url.as_deref(),
            Some(format!("memory://{}", record.storage_path).as_str())
        );
        let (bytes, content_type) = h.objects.blob(&record.storage_path).unwrap();
        assert_eq!(bytes.as_ref(), PDF);
        assert_eq!(content_type, PDF_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn flat_layout_overwrites_same_filename() {
        let h = harness(flat());
        h.catalog
            .create(&titled("First"), Upload::new("report.pdf", &b"one"[..]))
            .await
            .unwrap();
        let second = h
            .catalog
            .create(&titled("Second"), Upload::new("report.pdf", &b"two"[..]))
            .await
            .unwrap()
            .value;

        assert_eq!(second.id, "report.pdf");
        assert_eq!(second.storage_path, "report.pdf");
        let listed = h.catalog.list_or_search(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Second");
        assert_eq!(h.objects.blob("report.pdf").unwrap().0.as_ref(), b"two");
    }

    #[tokio::test]
    async fn missing_required_field_writes_nothing() {
        let h = harness(CatalogSettings::default());
        let err = h
            .catalog
            .create(&titled("   "), Upload::new("a.pdf", PDF))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        let mut fields = tag_fields("Khordha", "2024");
        fields.remove("gp");
        let tagged = harness(tagged());
        let err = tagged
            .catalog
            .create_batch(&fields, vec![Upload::new("a.pdf", PDF)])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(ref m) if m.contains("gp")));

        assert!(h.objects.is_empty() && h.metadata.is_empty());
        assert!(tagged.objects.is_empty() && tagged.metadata.is_empty());
    }

    #[tokio::test]
    async fn batch_skips_non_pdf_without_failing_siblings() {
        let h = harness(CatalogSettings::default());
        let outcome = h
            .catalog
            .create_batch(
                &titled("Batch"),
                vec![
                    Upload::new("a.pdf", PDF),
                    Upload::new("report.txt", &b"plain"[..]),
                    Upload::new("B.PDF", PDF),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.skipped, vec!["report.txt".to_string()]);
        assert!(outcome.failed.is_empty());
        assert_eq!(h.metadata.len(), 2);
    }

    #[tokio::test]
    async fn batch_without_any_pdf_is_rejected() {
        let h = harness(CatalogSettings::default());
        let err = h
            .catalog
            .create_batch(&titled("x"), vec![Upload::new("report.txt", &b"x"[..])])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        let err = h
            .catalog
            .create_batch(&titled("x"), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert!(h.objects.is_empty());
    }

    #[tokio::test]
    async fn batch_isolates_store_failures() {
        let h = harness(CatalogSettings::default());
        h.objects.set_faults(MemoryFaults {
            fail_puts: true,
            ..Default::default()
        });
        let outcome = h
            .catalog
            .create_batch(
                &titled("x"),
                vec![Upload::new("a.pdf", PDF), Upload::new("b.pdf", PDF)],
            )
            .await
            .unwrap();
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.failed.len(), 2);
        assert!(matches!(outcome.failed[0].1, CatalogError::Object(_)));
        assert!(h.metadata.is_empty());
    }

    #[tokio::test]
    async fn url_failure_is_reported_not_propagated() {
        let h = harness(flat());
        h.objects.set_faults(MemoryFaults {
            fail_urls: true,
            ..Default::default()
        });
        let created = h
            .catalog
            .create(&titled("Minutes"), Upload::new("minutes.pdf", PDF))
            .await
            .unwrap();
        assert!(created.is_partial());
        assert!(matches!(
            created.warnings[0],
            BestEffortFailure::UrlGeneration { .. }
        ));
        assert_eq!(created.value.public_url, None);
        assert_eq!(h.metadata.len(), 1);
    }

    #[tokio::test]
    async fn metadata_failure_leaves_orphan_blob() {
        let h = harness(CatalogSettings::default());
        h.metadata.set_fail_writes(true);
        let err = h
            .catalog
            .create(&titled("Minutes"), Upload::new("minutes.pdf", PDF))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Metadata(_)));

        let report = h.catalog.audit().await.unwrap();
        assert_eq!(report.records, 0);
        assert_eq!(report.orphan_blobs.len(), 1);
        assert!(!report.is_consistent());
    }

    #[tokio::test]
    async fn redirect_delivery_uses_cached_url() {
        let h = harness(flat());
        let record = h
            .catalog
            .create(&titled("Minutes"), Upload::new("minutes.pdf", PDF))
            .await
            .unwrap()
            .value;

        match h.catalog.retrieve(&record.id).await.unwrap() {
            Retrieval::Redirect { url, .. } => {
                assert!(url.starts_with("memory://minutes.pdf?ttl="))
            }
            Retrieval::Stream { .. } => panic!("expected redirect"),
        }

        h.objects.remove_raw("minutes.pdf");
        assert!(matches!(
            h.catalog.retrieve(&record.id).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn stream_failure_falls_back_to_cached_url() {
        let h = harness(tagged());
        let record = h
            .catalog
            .create(&tag_fields("Khordha", "2024"), Upload::new("a.pdf", PDF))
            .await
            .unwrap()
            .value;
        h.objects.set_faults(MemoryFaults {
            fail_reads: true,
            ..Default::default()
        });
        assert!(matches!(
            h.catalog.retrieve(&record.id).await.unwrap(),
            Retrieval::Redirect { .. }
        ));

        let plain = harness(CatalogSettings::default());
        let record = plain
            .catalog
            .create(&titled("x"), Upload::new("a.pdf", PDF))
            .await
            .unwrap()
            .value;
        plain.objects.set_faults(MemoryFaults {
            fail_reads: true,
            ..Default::default()
        });
        assert!(matches!(
            plain.catalog.retrieve(&record.id).await,
            Err(CatalogError::Server(_))
        ));
    }

    #[tokio::test]
    async fn retrieve_of_dangling_record_is_not_found() {
        let h = harness(CatalogSettings::default());
        let record = h
            .catalog
            .create(&titled("x"), Upload::new("a.pdf", PDF))
            .await
            .unwrap()
            .value;
        h.objects.remove_raw(&record.storage_path);

        assert!(matches!(
            h.catalog.retrieve(&record.id).await,
            Err(CatalogError::NotFound(_))
        ));
        let report = h.catalog.audit().await.unwrap();
        assert_eq!(report.dangling_records, vec![record.id]);
    }

    #[tokio::test]
    async fn delete_then_retrieve_is_not_found() {
        let h = harness(CatalogSettings::default());
        let record = h
            .catalog
            .create(&titled("x"), Upload::new("a.pdf", PDF))
            .await
            .unwrap()
            .value;
        let deleted = h.catalog.delete(&record.id).await.unwrap();
        assert!(!deleted.is_partial());
        assert!(matches!(
            h.catalog.retrieve(&record.id).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(h.catalog.audit().await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn delete_of_unknown_id_changes_nothing() {
        let h = harness(CatalogSettings::default());
        h.catalog
            .create(&titled("keep"), Upload::new("a.pdf", PDF))
            .await
            .unwrap();
        assert!(matches!(
            h.catalog.delete("nope").await,
            Err(CatalogError::NotFound(_))
        ));
        assert_eq!(h.metadata.len(), 1);
        assert_eq!(h.objects.len(), 1);
    }

    #[tokio::test]
    async fn blob_delete_failure_still_removes_record() {
        let h = harness(CatalogSettings::default());
        let record = h
            .catalog
            .create(&titled("x"), Upload::new("a.pdf", PDF))
            .await
            .unwrap()
            .value;
        h.objects.set_faults(MemoryFaults {
            fail_deletes: true,
            ..Default::default()
        });

        let deleted = h.catalog.delete(&record.id).await.unwrap();
        assert!(matches!(
            deleted.warnings.as_slice(),
            [BestEffortFailure::BlobDelete { .. }]
        ));
        assert!(h.metadata.is_empty());
        assert_eq!(h.catalog.audit().await.unwrap().orphan_blobs.len(), 1);
    }

    #[tokio::test]
    async fn search_query_whitespace_is_significant() {
        let h = harness(CatalogSettings::default());
        for title in ["Annual REPORT", "reportdraft"] {
            h.catalog
                .create(&titled(title), Upload::new("f.pdf", PDF))
                .await
                .unwrap();
        }

        let titles: Vec<String> = h
            .catalog
            .list_or_search(Some(" report"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["Annual REPORT"]);
        assert!(h.catalog.list_or_search(Some("draft ")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn long_title_and_filename_fit_on_disk() {
        use crate::services::{local_object_store::LocalObjectStore, url_signer::UrlSigner};

        let dir = tempfile::tempdir().unwrap();
        let objects = LocalObjectStore::new(
            dir.path(),
            UrlSigner::new(b"k".to_vec(), "http://catalog"),
        );
        let catalog = CatalogService::new(
            Arc::new(objects),
            Arc::new(MemoryMetadataStore::new()),
            CatalogSettings::default(),
        );

        let title = "T".repeat(300);
        let filename = format!("{}.pdf", "n".repeat(230));
        let record = catalog
            .create(&titled(&title), Upload::new(filename.clone(), PDF))
            .await
            .unwrap()
            .value;

        assert_eq!(record.title, title);
        assert_eq!(record.filename, filename);
        assert!(record.storage_path.split('/').all(|s| s.len() < 255));
        assert!(record.storage_path.ends_with(".pdf"));
        let bytes = read_all(catalog.retrieve(&record.id).await.unwrap()).await;
        assert_eq!(bytes, PDF);
        assert!(catalog.audit().await.unwrap().is_consistent());
    }

    #[test]
    fn long_segments_are_cut_on_char_boundaries() {
        let segment = key_segment(&"é".repeat(150));
        assert_eq!(segment.len(), MAX_KEY_SEGMENT_BYTES);
        assert!(segment.chars().all(|c| c == 'é'));

        let leaf = leaf_segment(&format!("{}.pdf", "ü".repeat(200)));
        assert!(leaf.len() <= MAX_KEY_SEGMENT_BYTES);
        assert!(leaf.ends_with(".pdf"));
        assert_eq!(leaf_segment("minutes.pdf"), "minutes.pdf");
    }

    #[test]
    fn key_segments_cannot_traverse() {
        assert_eq!(key_segment(" a/b "), "a_b");
        assert_eq!(key_segment(".."), "_");
        assert_eq!(key_segment(""), "_");
        assert_eq!(key_segment("PS 12"), "PS 12");
    }
}
