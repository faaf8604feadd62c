//! Liveness and readiness probes.
//!
//! - GET /healthz  -> process is up, no I/O
//! - GET /readyz   -> metadata store and object store both answer

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct Probe {
    status: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    checks: BTreeMap<&'static str, StoreCheck>,
}

#[derive(Serialize)]
struct StoreCheck {
    ok: bool,
    error: Option<String>,
}

impl StoreCheck {
    fn from_error(error: Option<String>) -> Self {
        Self {
            ok: error.is_none(),
            error,
        }
    }
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    Json(Probe {
        status: "ok",
        checks: BTreeMap::new(),
    })
}

/// `GET /readyz`
///
/// 200 when both stores pass their check, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let (metadata_error, objects_error) = state.catalog.check().await;

    let checks = BTreeMap::from([
        ("metadata", StoreCheck::from_error(metadata_error)),
        ("objects", StoreCheck::from_error(objects_error)),
    ]);
    if checks.values().all(|check| check.ok) {
        (
            StatusCode::OK,
            Json(Probe {
                status: "ok",
                checks,
            }),
        )
    } else {
        tracing::warn!("readiness check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Probe {
                status: "error",
                checks,
            }),
        )
    }
}
