//! `GET /api/v1/internal/files/{uuid}` — node-to-node download. Local disk
//! only; a node never proxies this endpoint on behalf of another node.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::error::CoreError;
use crate::pipeline::download_local;
use crate::router::AppState;
use crate::storage::parse_blob_uuid;

pub async fn download_file_internal(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Response {
    let uuid = uuid.to_lowercase();
    if parse_blob_uuid(&uuid).is_err() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match download_local(&state.blob_store, &uuid).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            if !matches!(e, CoreError::NotFound) {
                error!(error = %e, uuid = %uuid, "internal download failed");
            }
            // Bare status, no body, matching the reference implementation's
            // internal endpoint (it never writes a JSON envelope).
            e.status_code().into_response()
        }
    }
}
