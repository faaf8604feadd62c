//! Upload inputs as they arrive from a multipart form.

use bytes::Bytes;
use std::collections::HashMap;

/// Text fields of an upload form, keyed by field name.
pub type FormFields = HashMap<String, String>;

/// One file part of an upload request, fully buffered.
#[derive(Clone, Debug)]
pub struct Upload {
    /// Filename as sent by the client; may still contain directory components.
    pub filename: String,
    pub content: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Accepted uploads end in `.pdf`, case-insensitively.
    pub fn is_pdf(&self) -> bool {
        self.filename.to_ascii_lowercase().ends_with(".pdf")
    }

    /// Base name of the client filename with path separators and control
    /// characters removed. `None` when nothing usable is left.
    pub fn base_name(&self) -> Option<String> {
        let last = self
            .filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.filename);
        let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
        let cleaned = cleaned.trim();
        if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
            None
        } else {
            Some(cleaned.to_string())
        }
    }
}
