use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UploadedFile {
    pub id: i32,
    pub filename: String,
    pub file_type: String,
    pub file_path: String,
    pub uploaded_at: DateTime<Utc>,
}

pub struct InsertFile<'a> {
    pub filename: &'a str,
    pub file_type: &'a str,
    pub file_path: &'a str,
}

#[tracing::instrument(name = "db.files.insert", skip_all, fields(file.name = params.filename))]
pub async fn insert_file(pool: &PgPool, params: &InsertFile<'_>) -> Result<UploadedFile, sqlx::Error> {
    sqlx::query_as::<_, UploadedFile>(
        "INSERT INTO uploaded_files (filename, file_type, file_path) \
         VALUES ($1, $2, $3) \
         RETURNING id, filename, file_type, file_path, uploaded_at",
    )
    .bind(params.filename)
    .bind(params.file_type)
    .bind(params.file_path)
    .fetch_one(pool)
    .await
}

/// Rows for `ids` in the order requested. Unknown ids are skipped and
/// repeated ids yield the row once.
#[tracing::instrument(name = "db.files.get_by_ids", skip(pool))]
pub async fn get_files_by_ids(pool: &PgPool, ids: &[i32]) -> Result<Vec<UploadedFile>, sqlx::Error> {
    let rows = sqlx::query_as::<_, UploadedFile>(
        "SELECT id, filename, file_type, file_path, uploaded_at \
         FROM uploaded_files WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(order_by_ids(rows, ids))
}

fn order_by_ids(rows: Vec<UploadedFile>, ids: &[i32]) -> Vec<UploadedFile> {
    let mut by_id: HashMap<i32, UploadedFile> = rows.into_iter().map(|row| (row.id, row)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}
