//! `POST` and `GET /api/v1/external/files/{uuid}` — upload and download for
//! clients outside the cluster.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::error::CoreError;
use crate::pipeline::{download, upload, DownloadedBlob};
use crate::router::AppState;
use crate::storage::parse_blob_uuid;

#[derive(Serialize, Default)]
struct UploadResponse {
    err: String,
    id: i64,
    created_at: i64,
    size: i64,
}

/// Accepts a single-part multipart upload and publishes it under `uuid`.
pub async fn upload_file(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let uuid = uuid.to_lowercase();
    if parse_blob_uuid(&uuid).is_err() {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(UploadResponse {
                err: "invalid uuid".to_string(),
                ..Default::default()
            }),
        )
            .into_response();
    }

    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(UploadResponse {
                    err: "required one file part".to_string(),
                    ..Default::default()
                }),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(UploadResponse {
                    err: format!("error reading multipart section: {e}"),
                    ..Default::default()
                }),
            )
                .into_response();
        }
    };

    let data = match field.bytes().await {
        Ok(data) => data,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(UploadResponse {
                    err: format!("error reading multipart body: {e}"),
                    ..Default::default()
                }),
            )
                .into_response();
        }
    };

    let result = upload(
        &state.gateway,
        &state.blob_store,
        &state.lease,
        state.node_id,
        &uuid,
        &data,
    )
    .await;

    match result {
        Ok(outcome) => (
            StatusCode::OK,
            axum::Json(UploadResponse {
                err: String::new(),
                id: outcome.id,
                created_at: outcome.created_at,
                size: outcome.size,
            }),
        )
            .into_response(),
        Err(e) => {
            if !matches!(e, CoreError::AlreadyExists) {
                error!(error = %e, uuid = %uuid, "upload failed");
            }
            (
                e.status_code(),
                axum::Json(UploadResponse {
                    err: e.to_string(),
                    ..Default::default()
                }),
            )
                .into_response()
        }
    }
}

/// Serves a blob to an external caller, proxying from a live peer when this
/// node doesn't hold a copy.
pub async fn download_file_external(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Response {
    let uuid = uuid.to_lowercase();
    if parse_blob_uuid(&uuid).is_err() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match download(
        &state.gateway,
        &state.blob_store,
        &state.lease,
        &state.peer_client,
        &uuid,
    )
    .await
    {
        Ok(DownloadedBlob::Local(bytes)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        // Streamed straight from the peer's response body, never buffered
        // into memory on this node.
        Ok(DownloadedBlob::Proxied(response)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Body::from_stream(response.bytes_stream()),
        )
            .into_response(),
        Err(e) => {
            if !matches!(e, CoreError::NotFound) {
                error!(error = %e, uuid = %uuid, "download failed");
            }
            e.into_response()
        }
    }
}
