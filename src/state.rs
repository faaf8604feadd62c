//! Shared state handed to every handler.

use crate::services::{
    catalog_service::{CatalogService, UrlPolicy},
    object_store::ObjectStore,
    url_signer::UrlSigner,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,

    /// Same store the catalog writes to; read directly by the `/blobs` route.
    pub objects: Arc<dyn ObjectStore>,

    /// Verifies signatures of links minted by the local object store.
    pub signer: UrlSigner,
}

impl AppState {
    pub fn new(catalog: CatalogService, objects: Arc<dyn ObjectStore>, signer: UrlSigner) -> Self {
        Self {
            catalog,
            objects,
            signer,
        }
    }

    /// Blobs may be fetched without a signature.
    pub fn blobs_are_public(&self) -> bool {
        self.catalog.settings().url_policy == UrlPolicy::Public
    }
}
