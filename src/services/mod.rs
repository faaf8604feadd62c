//! Catalog service and the stores it orchestrates.

pub mod catalog_service;
pub mod local_object_store;
pub mod metadata_store;
pub mod object_store;
pub mod sqlite_metadata_store;
pub mod url_signer;
