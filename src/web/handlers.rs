//! HTTP handlers for the snapshot surface.

use crate::coordinator::{DeviceRegistry, DeviceView, ErrorReport};
use crate::metrics::Snapshot;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Shared state for every handler.
pub type AppState = Arc<DeviceRegistry>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<&'a ErrorReport>,
}

#[derive(Serialize)]
struct SnapshotBody<'a> {
    device: &'a str,
    stale: bool,
    consecutive_failures: u32,
    snapshot: &'a Snapshot,
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn list_devices(State(registry): State<AppState>) -> Json<Vec<DeviceView>> {
    Json(registry.views())
}

pub async fn device_snapshot(
    State(registry): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let Some(handle) = registry.get(&name) else {
        let body = ErrorBody {
            error: "unknown device",
            last_error: None,
        };
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    };

    let view = handle.view();
    match &view.snapshot {
        Some(snapshot) => Json(SnapshotBody {
            device: &view.name,
            stale: view.stale,
            consecutive_failures: view.consecutive_failures,
            snapshot,
        })
        .into_response(),
        None => {
            let body = ErrorBody {
                error: "no snapshot yet",
                last_error: view.last_error.as_ref(),
            };
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}
