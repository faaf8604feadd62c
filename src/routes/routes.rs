//! Defines routes for the catalog UI, its JSON API and blob links.
//!
//! ## Structure
//! - **Catalog pages**
//!   - `GET      /`                listing, `?search=` filters by title/tags
//!   - `POST     /upload`          multipart upload of one or more PDFs
//!   - `GET|POST /delete/{id}`     delete a record and its blob
//!   - `GET      /view/{id}`       inline PDF (or redirect to cached link)
//!   - `GET      /download/{id}`   attachment PDF (or redirect to cached link)
//!
//! - **API**
//!   - `GET /api/entries` records as JSON
//!   - `GET /api/audit`   orphan report
//!
//! - **Blobs**
//!   - `GET /blobs/{*key}` target of signed/public links; keys may be nested

use crate::{
    handlers::{
        blob_handlers::get_blob,
        catalog_handlers::{
            audit, delete_entry, download_entry, index, list_entries, upload, view_entry,
        },
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build and return the router for all catalog routes.
///
/// `max_upload_bytes` bounds request bodies; `None` lifts the limit.
pub fn routes(max_upload_bytes: Option<usize>) -> Router<AppState> {
    let body_limit = match max_upload_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // catalog pages
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/delete/{id}", get(delete_entry).post(delete_entry))
        .route("/view/{id}", get(view_entry))
        .route("/download/{id}", get(download_entry))
        // API
        .route("/api/entries", get(list_entries))
        .route("/api/audit", get(audit))
        // blob links
        .route("/blobs/{*key}", get(get_blob))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
}
