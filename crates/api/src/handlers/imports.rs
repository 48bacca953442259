//! Handlers for `/imports`: CSV upload and import submission.

use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use catalog_core::types::DbId;
use catalog_pipeline::ImportSource;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Accepted file extension for uploads.
const CSV_EXTENSION: &str = "csv";

#[derive(Debug, Serialize)]
pub struct ImportAccepted {
    pub job_id: DbId,
}

/// POST /api/v1/imports
///
/// Multipart form with a required `file` field (`.csv`, non-empty, at most
/// `max_upload_bytes`) and an optional `batch_size` field. The upload is
/// streamed to `upload_dir` and an import job is submitted for it.
pub async fn upload_import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<ImportAccepted>>)> {
    let mut stored: Option<PathBuf> = None;
    let mut batch_size_raw: Option<String> = None;

    let collected = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" => {
                    if stored.is_some() {
                        return Err(AppError::BadRequest(
                            "Only one 'file' field is allowed".into(),
                        ));
                    }
                    stored = Some(store_upload(&state, field).await?);
                }
                "batch_size" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?;
                    batch_size_raw = Some(text);
                }
                _ => {}
            }
        }
        Ok::<(), AppError>(())
    }
    .await;

    let submitted = match (collected, stored.as_deref()) {
        (Err(e), _) => Err(e),
        (Ok(()), None) => Err(AppError::BadRequest("Missing required 'file' field".into())),
        (Ok(()), Some(path)) => submit(&state, path, batch_size_raw.as_deref()).await,
    };

    match submitted {
        Ok(job_id) => Ok((
            StatusCode::ACCEPTED,
            Json(DataResponse {
                data: ImportAccepted { job_id },
            }),
        )),
        Err(e) => {
            if let Some(path) = &stored {
                discard(path).await;
            }
            Err(e)
        }
    }
}

async fn submit(state: &AppState, path: &Path, batch_size: Option<&str>) -> AppResult<DbId> {
    let batch_size = batch_size
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            raw.parse::<usize>().map_err(|_| {
                AppError::BadRequest(format!("batch_size must be a positive integer, got '{raw}'"))
            })
        })
        .transpose()?;

    let job_id = state
        .coordinator
        .submit_import(ImportSource::file(path), batch_size)
        .await?;
    Ok(job_id)
}

/// Stream one uploaded file to disk, enforcing the extension, the size cap
/// and non-emptiness.
async fn store_upload(state: &AppState, mut field: Field<'_>) -> AppResult<PathBuf> {
    let original = field.file_name().unwrap_or("").to_string();
    if !has_csv_extension(&original) {
        return Err(AppError::BadRequest(format!(
            "Unsupported file '{original}'. Only .csv uploads are accepted"
        )));
    }

    let dir = &state.config.upload_dir;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let path = dir.join(format!(
        "{}_{}",
        uuid::Uuid::new_v4(),
        sanitize_file_name(&original)
    ));

    let written = write_field(&mut field, &path, state.config.max_upload_bytes).await;
    match written {
        Ok(0) => {
            discard(&path).await;
            Err(AppError::BadRequest("Uploaded file is empty".into()))
        }
        Ok(size) => {
            tracing::info!(file = %path.display(), size, "CSV upload stored");
            Ok(path)
        }
        Err(e) => {
            discard(&path).await;
            Err(e)
        }
    }
}

async fn write_field(field: &mut Field<'_>, path: &Path, max_bytes: u64) -> AppResult<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let mut size: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        size += chunk.len() as u64;
        if size > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Upload exceeds the {max_bytes} byte limit"
            )));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))?;
    }

    file.flush()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    Ok(size)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(file = %path.display(), error = %e, "Failed to remove rejected upload");
    }
}

fn has_csv_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(CSV_EXTENSION))
}

/// Last path component with anything outside `[A-Za-z0-9._-]` replaced.
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
