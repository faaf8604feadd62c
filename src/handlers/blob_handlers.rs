//! Serves blobs behind the links cached on records.
//!
//! `GET /blobs/{*key}` requires a valid `expires`/`sig` pair unless the
//! catalog publishes blobs publicly.

use crate::{
    errors::AppError,
    handlers::catalog_handlers::{Disposition, set_pdf_headers},
    services::{object_store::ObjectStoreError, url_signer::SignatureError},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: Option<u64>,
    pub sig: Option<String>,
}

/// GET `/blobs/{*key}`: stream a blob reached through a signed or public link.
pub async fn get_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<SignedQuery>,
) -> Result<Response, AppError> {
    if !state.blobs_are_public() {
        let (Some(expires), Some(sig)) = (q.expires, q.sig.as_deref()) else {
            return Err(AppError::new(StatusCode::FORBIDDEN, "missing signature"));
        };
        state
            .signer
            .verify(&key, expires, sig)
            .map_err(|err| match err {
                SignatureError::Expired | SignatureError::Mismatch => {
                    AppError::new(StatusCode::FORBIDDEN, err.to_string())
                }
                SignatureError::InvalidSecret => AppError::internal(err.to_string()),
            })?;
    }

    let blob = state.objects.get(&key).await.map_err(|err| match err {
        ObjectStoreError::NotFound(_) | ObjectStoreError::InvalidKey(_) => {
            AppError::not_found(err.to_string())
        }
        other => AppError::internal(other.to_string()),
    })?;

    let filename = key.rsplit('/').next().unwrap_or(&key);
    let filename = filename
        .split_once("___")
        .map(|(_, name)| name)
        .unwrap_or(filename);

    let mut response = Response::new(Body::from_stream(ReaderStream::new(blob.reader)));
    *response.status_mut() = StatusCode::OK;
    set_pdf_headers(
        response.headers_mut(),
        filename,
        blob.size_bytes,
        Disposition::Inline,
    );
    Ok(response)
}
