//! Multipart file upload handling for `POST /upload`.

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;
use std::path::Path;
use tracing::info;

use crate::server::SharedState;

/// Per-file size cap.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub async fn handle_upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return error_response(StatusCode::BAD_REQUEST, "missing \"file\" field"),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        };
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload".to_string());
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        };
        if data.len() > MAX_UPLOAD_BYTES {
            return error_response(StatusCode::BAD_REQUEST, "file exceeds the 10MiB limit");
        }

        if let Err(e) = tokio::fs::create_dir_all(&state.upload_dir).await {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }

        let extension = Path::new(&original_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let stored_name = format!(
            "file-{}-{}{}",
            Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple(),
            extension
        );
        let stored_path = state.upload_dir.join(&stored_name);

        if let Err(e) = tokio::fs::write(&stored_path, &data).await {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }

        info!("stored upload {original_name} as {}", stored_path.display());
        return (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "file": {
                    "filename": stored_name,
                    "originalname": original_name,
                    "size": data.len(),
                    "path": stored_path.to_string_lossy(),
                }
            })),
        )
            .into_response();
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
