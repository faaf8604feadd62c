//! PDF catalog: uploads PDFs with descriptive fields, keeps the bytes in an
//! object store and the searchable records in a metadata store.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use state::AppState;

/// Router with state attached, ready to serve.
pub fn app(state: AppState, max_upload_bytes: Option<usize>) -> Router {
    routes::routes::routes(max_upload_bytes).with_state(state)
}
