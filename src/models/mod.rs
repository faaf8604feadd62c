//! Core data models for the PDF catalog.
//!
//! `Record` is the metadata entry persisted in the metadata store and
//! serialized as JSON by the API; `Upload` carries a buffered file part.

pub mod record;
pub mod upload;
