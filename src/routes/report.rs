use std::path::PathBuf;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::Query;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::AppState;
use crate::analysis::ArtifactKind;
use crate::db::files::{UploadedFile, get_files_by_ids};
use crate::error::{AppError, AppResult};
use crate::pipeline::render_to_bytes;
use crate::render::RenderError;
use crate::report::CanonicalReport;

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub file_ids: Vec<i32>,
}

/// Image and tabular artifact paths, each in request order.
#[derive(Debug, Default, PartialEq)]
pub struct Artifacts {
    pub images: Vec<PathBuf>,
    pub tables: Vec<PathBuf>,
}

pub fn partition_artifacts(files: &[UploadedFile]) -> AppResult<Artifacts> {
    let mut artifacts = Artifacts::default();
    for file in files {
        let path = PathBuf::from(&file.file_path);
        match ArtifactKind::classify(&file.file_type, &file.filename) {
            Some(ArtifactKind::Image) => artifacts.images.push(path),
            Some(ArtifactKind::Tabular) => artifacts.tables.push(path),
            None => {
                return Err(AppError::Validation(format!(
                    "unsupported file type {} for {}",
                    file.file_type, file.filename
                )));
            }
        }
    }
    Ok(artifacts)
}

async fn load_artifacts(state: &AppState, ids: &[i32]) -> AppResult<Artifacts> {
    if ids.is_empty() {
        return Err(AppError::Validation("file_ids must not be empty".to_string()));
    }

    let files = get_files_by_ids(&state.pool, ids).await?;
    if files.is_empty() {
        return Err(AppError::NotFound("Files not found".to_string()));
    }
    if files.len() < ids.len() {
        tracing::warn!(
            requested = ids.len(),
            found = files.len(),
            "some requested files were not found"
        );
    }

    partition_artifacts(&files)
}

fn pdf_response(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

pub async fn get_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Json<Value>> {
    let artifacts = load_artifacts(&state, &query.file_ids).await?;
    let report = state
        .pipeline
        .run(&artifacts.images, &artifacts.tables)
        .await?;

    Ok(Json(json!({ "report": report })))
}

pub async fn get_report_pdf(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Response> {
    let artifacts = load_artifacts(&state, &query.file_ids).await?;
    let report = state
        .pipeline
        .run(&artifacts.images, &artifacts.tables)
        .await?;

    let filename = format!("report-{}.pdf", Uuid::new_v4());
    let path = state
        .pipeline
        .render_to_file(report, &state.config.report_dir.join(&filename))
        .await?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::Internal(format!("failed to read {}: {e}", path.display())))?;

    tracing::info!(document.path = %path.display(), document.bytes = bytes.len(), "report document written");

    Ok(pdf_response(bytes, &filename))
}

/// Renders a report returned earlier by `GET /report`, without calling the
/// model. Accepts the report object itself or the `{"report": {...}}` envelope.
pub async fn render_report(Json(body): Json<Value>) -> AppResult<Response> {
    let Value::Object(mut object) = body else {
        return Err(RenderError::NotAnObject.into());
    };
    if object.len() == 1
        && let Some(Value::Object(inner)) = object.get("report")
    {
        object = inner.clone();
    }

    let bytes = render_to_bytes(CanonicalReport::from_object(object)).await?;
    Ok(pdf_response(bytes, "report.pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn file(id: i32, filename: &str, file_type: &str) -> UploadedFile {
        UploadedFile {
            id,
            filename: filename.to_string(),
            file_type: file_type.to_string(),
            file_path: format!("/data/{filename}"),
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_partition_keeps_request_order() {
        let artifacts = partition_artifacts(&[
            file(1, "sales.csv", "text/csv"),
            file(2, "chart.png", "image/png"),
            file(3, "costs.tsv", "text/tab-separated-values"),
            file(4, "photo.jpg", "image/jpeg"),
        ])
        .unwrap();

        assert_eq!(
            artifacts,
            Artifacts {
                images: vec![PathBuf::from("/data/chart.png"), PathBuf::from("/data/photo.jpg")],
                tables: vec![PathBuf::from("/data/sales.csv"), PathBuf::from("/data/costs.tsv")],
            }
        );
    }

    #[test]
    fn test_partition_rejects_unsupported_types() {
        let err = partition_artifacts(&[file(1, "notes.pdf", "application/pdf")]).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("notes.pdf")));
    }
}
