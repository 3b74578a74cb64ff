// src/server/uploads.rs
// Multipart upload intake and stored-file serving

use axum::{
    extract::{Json, Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::info;

use super::state::AppState;
use crate::documents::uploads::{MAX_UPLOAD_BYTES, UPLOAD_URL_PREFIX, UploadStore};
use crate::error::PentadError;

/// Request body cap for /upload: a handful of maximum-size files
pub const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES * 5;

/// Multipart field the files arrive under
const FILES_FIELD: &str = "files";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub urls: Vec<String>,
}

pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, PentadError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PentadError::Upload(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| PentadError::Upload("file part is missing a filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PentadError::Upload(format!("failed to read {}: {}", filename, e)))?;

        // Every part is checked before anything is written
        UploadStore::validate(&filename, &bytes)?;
        files.push((filename, bytes));
    }

    if files.is_empty() {
        return Err(PentadError::Upload("no files provided".to_string()));
    }

    let mut urls = Vec::with_capacity(files.len());
    for (filename, bytes) in &files {
        urls.push(state.uploads.save(filename, bytes).await?);
    }

    info!(count = urls.len(), "files uploaded");
    Ok(Json(UploadResponse { urls }))
}

/// Serve a stored upload by name
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, PentadError> {
    let path = state
        .uploads
        .resolve(&format!("{}{}", UPLOAD_URL_PREFIX, name))?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "upload not found" })),
            )
                .into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response())
}
