//! HTTP handlers for the catalog: listing, upload, delete and download.
//! Downloads stream blob bodies to avoid buffering in memory; everything else
//! is delegated to `CatalogService`.

use crate::{
    errors::AppError,
    handlers::listing_page::render_listing,
    models::{
        record::Record,
        upload::{FormFields, Upload},
    },
    services::catalog_service::{AuditReport, CatalogError, Retrieval},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, Response},
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

/// Query params accepted by the listing endpoints.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

/// How a streamed download is presented by the browser.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Disposition {
    Inline,
    Attachment,
}

/// GET `/`: HTML listing, optionally filtered by `?search=`.
pub async fn index(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Html<String>, AppError> {
    let search = q.search.unwrap_or_default();
    let records = state.catalog.list_or_search(Some(&search)).await?;
    Ok(Html(render_listing(
        &records,
        &search,
        state.catalog.settings(),
    )))
}

/// GET `/api/entries`: JSON array of records, optionally filtered by `?search=`.
pub async fn list_entries(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<Record>>, AppError> {
    let records = state.catalog.list_or_search(q.search.as_deref()).await?;
    Ok(Json(records))
}

/// GET `/api/audit`: records without blobs and blobs without records.
pub async fn audit(State(state): State<AppState>) -> Result<Json<AuditReport>, AppError> {
    Ok(Json(state.catalog.audit().await?))
}

/// POST `/upload`: multipart form with text fields and one or more files.
///
/// Redirects to the listing when at least one file was catalogued.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut fields = FormFields::new();
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let content = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                // browsers send an empty part for an untouched file input
                if filename.is_empty() && content.is_empty() {
                    continue;
                }
                uploads.push(Upload::new(filename, content));
            }
            None => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                fields.insert(name, text);
            }
        }
    }

    let outcome = state.catalog.create_batch(&fields, uploads).await?;
    for created in &outcome.created {
        for warning in &created.warnings {
            warn!(id = %created.value.id, ?warning, "upload completed partially");
        }
    }
    info!(
        created = outcome.created.len(),
        skipped = outcome.skipped.len(),
        failed = outcome.failed.len(),
        "processed upload request"
    );

    if outcome.created.is_empty() {
        let all_invalid = outcome
            .failed
            .iter()
            .all(|(_, err)| matches!(err, CatalogError::Validation(_)));
        let reasons = outcome
            .failed
            .iter()
            .map(|(filename, err)| format!("{filename}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        let message = format!("no file was stored ({reasons})");
        return Err(if all_invalid {
            AppError::bad_request(message)
        } else {
            AppError::internal(message)
        });
    }
    redirect("/")
}

/// GET or POST `/delete/{id}`: remove the blob and its record.
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let deleted = state.catalog.delete(&id).await?;
    for warning in &deleted.warnings {
        warn!(%id, ?warning, "delete completed partially");
    }
    redirect("/")
}

/// GET `/view/{id}`: show the PDF inline.
pub async fn view_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    serve(&state, &id, Disposition::Inline).await
}

/// GET `/download/{id}`: download the PDF as an attachment.
pub async fn download_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    serve(&state, &id, Disposition::Attachment).await
}

async fn serve(state: &AppState, id: &str, disposition: Disposition) -> Result<Response, AppError> {
    match state.catalog.retrieve(id).await? {
        Retrieval::Redirect { url, .. } => redirect(&url),
        Retrieval::Stream { record, blob } => {
            let body = Body::from_stream(ReaderStream::new(blob.reader));
            let mut response = Response::new(body);
            *response.status_mut() = StatusCode::OK;
            set_pdf_headers(
                response.headers_mut(),
                &record.filename,
                blob.size_bytes,
                disposition,
            );
            Ok(response)
        }
    }
}

/// 302 to `location`.
pub fn redirect(location: &str) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(location)
        .map_err(|_| AppError::internal(format!("invalid redirect target `{location}`")))?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    response.headers_mut().insert(header::LOCATION, value);
    Ok(response)
}

pub(crate) fn set_pdf_headers(
    headers: &mut HeaderMap,
    filename: &str,
    size_bytes: u64,
    disposition: Disposition,
) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/pdf"),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&size_bytes.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    if let Ok(value) = HeaderValue::from_str(&content_disposition(filename, disposition)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}

/// `Content-Disposition` with an ASCII fallback name plus the RFC 5987 form.
fn content_disposition(filename: &str, disposition: Disposition) -> String {
    let kind = match disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    format!(
        "{kind}; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_keeps_unicode_in_extended_form() {
        let value = content_disposition("zápis \"1\".pdf", Disposition::Attachment);
        assert_eq!(
            value,
            "attachment; filename=\"z_pis _1_.pdf\"; filename*=UTF-8''z%C3%A1pis%20%221%22.pdf"
        );
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[test]
    fn redirect_sets_found_and_location() {
        let response = redirect("/").unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
    }
}
