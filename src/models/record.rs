//! Represents one catalogued PDF and the descriptive fields it was uploaded with.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Hierarchical tags used by the tagged schema.
///
/// Field order is also the grouping order of the listing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Tags {
    pub district: String,
    pub block: String,
    pub gp: String,
    pub polling_station: String,
    pub year: String,
}

impl Tags {
    /// Tag values in grouping order.
    pub fn values(&self) -> [&str; 5] {
        [
            &self.district,
            &self.block,
            &self.gp,
            &self.polling_station,
            &self.year,
        ]
    }
}

/// A single metadata entry describing an uploaded file.
///
/// The `Record` never holds content bytes; `storage_path` is the key of the
/// blob in the object store. Nothing guarantees that key still resolves.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Primary key in the metadata store (filename or generated id).
    pub id: String,

    /// Free-text title shown in the listing.
    pub title: String,

    /// Hierarchical tags, only present for the tagged schema.
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,

    /// Who uploaded the file.
    pub uploader: String,

    /// Base name of the uploaded file.
    pub filename: String,

    /// Object store key of the blob.
    pub storage_path: String,

    /// Size of the stored blob in bytes.
    pub size_bytes: i64,

    /// Local time of the upload, `%Y-%m-%d %H:%M:%S`.
    pub uploaded_at: String,

    /// Signed or public link cached at upload time; never refreshed.
    pub public_url: Option<String>,
}

impl Record {
    /// Case-insensitive substring match against the title and tag values.
    ///
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        if self.title.to_lowercase().contains(needle) {
            return true;
        }
        self.tags.as_ref().is_some_and(|tags| {
            tags.values()
                .iter()
                .any(|value| value.to_lowercase().contains(needle))
        })
    }

    /// Listing order: tags first (empty when absent), then title, then id.
    pub fn sort_key(&self) -> ([&str; 5], &str, &str) {
        let tags = self.tags.as_ref().map(Tags::values).unwrap_or([""; 5]);
        (tags, self.title.as_str(), self.id.as_str())
    }
}

/// Flat row shape of the `records` table.
#[derive(FromRow, Debug)]
pub struct RecordRow {
    pub id: String,
    pub title: String,
    pub district: Option<String>,
    pub block: Option<String>,
    pub gp: Option<String>,
    pub polling_station: Option<String>,
    pub year: Option<String>,
    pub uploader: String,
    pub filename: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub uploaded_at: String,
    pub public_url: Option<String>,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        let tags = match (row.district, row.block, row.gp, row.polling_station, row.year) {
            (Some(district), Some(block), Some(gp), Some(polling_station), Some(year)) => {
                Some(Tags {
                    district,
                    block,
                    gp,
                    polling_station,
                    year,
                })
            }
            _ => None,
        };

        Self {
            id: row.id,
            title: row.title,
            tags,
            uploader: row.uploader,
            filename: row.filename,
            storage_path: row.storage_path,
            size_bytes: row.size_bytes,
            uploaded_at: row.uploaded_at,
            public_url: row.public_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, tags: Option<Tags>) -> Record {
        Record {
            id: "id-1".into(),
            title: title.into(),
            tags,
            uploader: "anonymous".into(),
            filename: "a.pdf".into(),
            storage_path: "a.pdf".into(),
            size_bytes: 3,
            uploaded_at: "2025-01-01 10:00:00".into(),
            public_url: None,
        }
    }

    fn tags() -> Tags {
        Tags {
            district: "Khordha".into(),
            block: "Balianta".into(),
            gp: "Benupur".into(),
            polling_station: "PS-12".into(),
            year: "2024".into(),
        }
    }

    #[test]
    fn matches_title_case_insensitively() {
        let rec = record("Board Minutes", None);
        assert!(rec.matches("minutes"));
        assert!(rec.matches("board m"));
        assert!(!rec.matches("agenda"));
    }

    #[test]
    fn empty_needle_matches_everything() {
        assert!(record("", None).matches(""));
    }

    #[test]
    fn matches_tag_values() {
        let rec = record("scan", Some(tags()));
        assert!(rec.matches("benu"));
        assert!(rec.matches("ps-1"));
        assert!(!rec.matches("cuttack"));
    }

    #[test]
    fn serializes_tags_inline() {
        let rec = record("scan", Some(tags()));
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["district"], "Khordha");
        assert!(value.get("tags").is_none());

        let untagged = serde_json::to_value(record("scan", None)).unwrap();
        assert!(untagged.get("district").is_none());
    }

    #[test]
    fn row_without_complete_tags_has_none() {
        let row = RecordRow {
            id: "x".into(),
            title: "t".into(),
            district: Some("d".into()),
            block: None,
            gp: None,
            polling_station: None,
            year: None,
            uploader: "u".into(),
            filename: "x.pdf".into(),
            storage_path: "x.pdf".into(),
            size_bytes: 0,
            uploaded_at: "2025-01-01 00:00:00".into(),
            public_url: None,
        };
        assert_eq!(Record::from(row).tags, None);
    }
}
