use axum::Json;
use axum::extract::{Multipart, State};
use serde::Serialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::db::files::{InsertFile, insert_file};
use crate::error::{AppError, AppResult};

const FILES_FIELD: &str = "files";

#[derive(Debug, Serialize)]
pub struct UploadedSummary {
    pub file_id: i32,
    pub filename: String,
    pub file_type: String,
}

/// Stores every `files` part on disk and records its metadata.
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut uploaded = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let file_type = field
            .content_type()
            .filter(|ct| !ct.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("could not read {filename}: {e}")))?;

        let path = state
            .storage
            .save(&filename, &bytes)
            .await
            .map_err(|e| AppError::Internal(format!("failed to store {filename}: {e}")))?;

        let row = insert_file(
            &state.pool,
            &InsertFile {
                filename: &filename,
                file_type: &file_type,
                file_path: &path.to_string_lossy(),
            },
        )
        .await?;

        tracing::info!(
            file.id = row.id,
            file.name = %row.filename,
            file.type = %row.file_type,
            file.bytes = bytes.len(),
            "file uploaded"
        );

        uploaded.push(UploadedSummary {
            file_id: row.id,
            filename: row.filename,
            file_type: row.file_type,
        });
    }

    if uploaded.is_empty() {
        return Err(AppError::Validation(format!(
            "no files uploaded; send one or more `{FILES_FIELD}` parts"
        )));
    }

    Ok(Json(json!({
        "status": "success",
        "files": uploaded,
    })))
}
