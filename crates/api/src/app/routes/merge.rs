//! Tabular merge endpoints (local-upload and cloud-storage variants).

use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path, Query},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use tabops_core::{JobId, JobType};
use tabops_tabular::io::SUPPORTED_EXTENSIONS;
use tabops_tabular::{match_preview, read_dataset_bytes, to_xlsx_bytes, Dataset, TabularError};

use crate::app::workers::merge::{run_merge_job, MergeJob, MergeSource};
use crate::app::{dto, errors, AppServices};

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn router() -> Router {
    Router::new()
        .route("/upload", post(upload))
        .route("/preview-match", post(preview_match_endpoint))
        .route("/jobs", post(create_job))
        .route("/jobs/:id", get(job_status).delete(delete_job))
        .route("/results/:id", get(download_csv))
        .route("/results/:id/excel", get(download_excel))
        .route("/r2/upload-url", post(upload_url))
        .route("/r2/preview", post(stored_preview))
        .route("/r2/jobs", post(create_stored_job))
        .route("/r2/results/*key", get(stored_result_url))
}

/// Read the `file` part out of a multipart body.
pub(crate) async fn read_multipart_file(
    multipart: &mut Multipart,
    part_name: &str,
) -> Result<(String, Bytes), axum::response::Response> {
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(part_name) => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => return Ok((file_name, bytes)),
                    Err(e) => {
                        return Err(errors::bad_request(format!("failed to read upload: {e}")))
                    }
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => return Err(errors::bad_request("No file selected")),
            Err(e) => return Err(errors::bad_request(format!("malformed multipart body: {e}"))),
        }
    }
}

pub(crate) async fn parse_dataset(
    name: String,
    bytes: Vec<u8>,
) -> Result<Dataset, axum::response::Response> {
    let parsed =
        tokio::task::spawn_blocking(move || read_dataset_bytes(&name, &bytes)).await;
    match parsed {
        Ok(Ok(dataset)) => Ok(dataset),
        Ok(Err(e)) => Err(errors::internal(e.to_string())),
        Err(e) => Err(errors::internal(format!("dataset parse task failed: {e}"))),
    }
}

fn dataset_summary(dataset: &Dataset, preview_rows: usize) -> serde_json::Value {
    json!({
        "columns": dataset.columns(),
        "dtypes": dataset.infer_dtypes(),
        "rowCount": dataset.row_count(),
        "preview": dataset.preview(preview_rows),
        "uniqueCounts": dataset.unique_counts(),
    })
}

/// POST /api/merge/upload
///
/// Upload and parse a file, returning its preview and column metadata.
pub async fn upload(
    Extension(services): Extension<Arc<AppServices>>,
    mut multipart: Multipart,
) -> axum::response::Response {
    let (file_name, bytes) = match read_multipart_file(&mut multipart, "file").await {
        Ok(file) => file,
        Err(response) => return response,
    };

    let saved = match services
        .files
        .save_upload(&file_name, SUPPORTED_EXTENSIONS, &bytes)
        .await
    {
        Ok(saved) => saved,
        Err(e @ tabops_infra::files::FileStoreError::Io(_)) => {
            error!("failed to persist upload: {e}");
            return errors::internal(e.to_string());
        }
        Err(e) => return errors::bad_request(e.to_string()),
    };

    let dataset = match parse_dataset(file_name.clone(), bytes.to_vec()).await {
        Ok(dataset) => dataset,
        Err(response) => return response,
    };

    let mut body = dataset_summary(&dataset, 5);
    body["success"] = json!(true);
    body["fileId"] = json!(saved.file_id);
    body["fileName"] = json!(file_name);
    body["fileType"] = json!(saved.extension);
    Json(body).into_response()
}

/// POST /api/merge/preview-match
pub async fn preview_match_endpoint(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::PreviewMatchRequest>,
) -> axum::response::Response {
    let (Ok(file_a), Ok(file_b)) = (body.file_a_id.parse(), body.file_b_id.parse()) else {
        return errors::not_found("Files not found. Please re-upload.");
    };

    let (Some(path_a), Some(path_b)) = (
        services.files.find_upload(file_a, SUPPORTED_EXTENSIONS).await,
        services.files.find_upload(file_b, SUPPORTED_EXTENSIONS).await,
    ) else {
        return errors::not_found("Files not found. Please re-upload.");
    };

    let result = tokio::task::spawn_blocking(move || {
        let left = tabops_tabular::read_dataset_path(&path_a)?;
        let right = tabops_tabular::read_dataset_path(&path_b)?;
        match_preview(&left, &right, &body.key_a, &body.key_b)
    })
    .await;

    match result {
        Ok(Ok(preview)) => {
            let mut body = serde_json::to_value(&preview).unwrap_or_default();
            body["success"] = json!(true);
            Json(body).into_response()
        }
        Ok(Err(e @ TabularError::MissingColumn(_))) => errors::bad_request(e.to_string()),
        Ok(Err(e)) => errors::internal(e.to_string()),
        Err(e) => errors::internal(format!("preview task failed: {e}")),
    }
}

/// POST /api/merge/jobs
///
/// Validates inputs, creates the job record, spawns the worker, and returns
/// the job id before any work happens.
pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::MergeRequest>,
) -> axum::response::Response {
    let (Ok(file_a), Ok(file_b)) = (body.file_a_id.parse(), body.file_b_id.parse()) else {
        return errors::not_found("Files not found. Please re-upload.");
    };

    let (Some(path_a), Some(path_b)) = (
        services.files.find_upload(file_a, SUPPORTED_EXTENSIONS).await,
        services.files.find_upload(file_b, SUPPORTED_EXTENSIONS).await,
    ) else {
        return errors::not_found("Files not found. Please re-upload.");
    };

    let job_id = JobId::new();
    services.jobs.create(job_id, JobType::Merge).await;

    let job = MergeJob {
        source: MergeSource::LocalFiles {
            left: vec![path_a],
            right: vec![path_b],
        },
        join: body.join_type,
        left_key: body.left_key,
        right_key: body.right_key,
        selected_columns: body.selected_columns,
    };
    tokio::spawn(run_merge_job(services.clone(), job_id, job));

    (StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))).into_response()
}

/// GET /api/merge/jobs/:id
pub async fn job_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(job_id) = id.parse::<JobId>() else {
        return errors::not_found("Job not found");
    };
    match services.jobs.get(job_id).await {
        Some(record) => Json(record).into_response(),
        None => errors::not_found("Job not found"),
    }
}

/// DELETE /api/merge/jobs/:id
pub async fn delete_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(job_id) = id.parse::<JobId>() else {
        return errors::not_found("Job not found");
    };
    services.jobs.delete(job_id).await;
    Json(json!({ "success": true })).into_response()
}

fn csv_attachment(bytes: Vec<u8>, filename: &str) -> axum::response::Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// GET /api/merge/results/:id
pub async fn download_csv(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(result_id) = id.parse::<tabops_core::ResultId>() else {
        return errors::not_found("Result not found");
    };
    let path = services.files.result_path(&format!("{result_id}.csv"));
    match tokio::fs::read(&path).await {
        Ok(bytes) => csv_attachment(bytes, "merged_data.csv"),
        Err(_) => errors::not_found("Result not found"),
    }
}

/// GET /api/merge/results/:id/excel
pub async fn download_excel(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(result_id) = id.parse::<tabops_core::ResultId>() else {
        return errors::not_found("Result not found");
    };
    let path = services.files.result_path(&format!("{result_id}.csv"));
    let Ok(bytes) = tokio::fs::read(&path).await else {
        return errors::not_found("Result not found");
    };

    let converted = tokio::task::spawn_blocking(move || {
        let dataset = tabops_tabular::io::read_csv_bytes(&bytes)?;
        to_xlsx_bytes(&dataset, "Merged Data")
    })
    .await;

    match converted {
        Ok(Ok(xlsx)) => (
            [
                (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=merged_data.xlsx".to_string(),
                ),
            ],
            xlsx,
        )
            .into_response(),
        Ok(Err(e)) => errors::internal(e.to_string()),
        Err(e) => errors::internal(format!("excel export task failed: {e}")),
    }
}

/// Generate a unique storage key for a direct upload.
pub(crate) fn fresh_upload_key(prefix: &str, filename: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let id = Uuid::now_v7().simple().to_string();
    let suffix = &id[id.len() - 8..];
    format!("{prefix}/{timestamp}-{suffix}-{filename}")
}

/// POST /api/merge/r2/upload-url
pub async fn upload_url(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::UploadUrlParams>,
) -> axum::response::Response {
    let Some(store) = services.object_store.clone() else {
        return errors::unavailable("Object storage not available");
    };

    let key = fresh_upload_key("merge-uploads", &params.filename);
    match store
        .presign_put(&key, std::time::Duration::from_secs(3600))
        .await
    {
        Ok(url) => Json(json!({
            "uploadUrl": url,
            "key": key,
            "expiresIn": 3600,
        }))
        .into_response(),
        Err(e) => {
            error!("failed to presign upload: {e}");
            errors::internal("Failed to generate upload URL")
        }
    }
}

/// POST /api/merge/r2/preview
///
/// Preview N stored files concatenated row-wise.
pub async fn stored_preview(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StoredPreviewRequest>,
) -> axum::response::Response {
    let Some(store) = services.object_store.clone() else {
        return errors::unavailable("Object storage not available");
    };
    if body.keys.is_empty() {
        return errors::bad_request("No keys provided");
    }

    let mut parts = Vec::with_capacity(body.keys.len());
    for key in &body.keys {
        let bytes = match store.get(key).await {
            Ok(bytes) => bytes,
            Err(_) => return errors::not_found(format!("File not found: {key}")),
        };
        match parse_dataset(key.clone(), bytes.to_vec()).await {
            Ok(dataset) => parts.push(dataset),
            Err(response) => return response,
        }
    }

    match Dataset::concat(parts) {
        Ok(dataset) => Json(dataset_summary(&dataset, 5)).into_response(),
        Err(e) => errors::internal(e.to_string()),
    }
}

/// POST /api/merge/r2/jobs
pub async fn create_stored_job(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StoredMergeRequest>,
) -> axum::response::Response {
    let Some(store) = services.object_store.clone() else {
        return errors::unavailable("Object storage not available");
    };
    if body.keys_a.is_empty() || body.keys_b.is_empty() {
        return errors::bad_request("Both sides need at least one file key");
    }

    for key in body.keys_a.iter().chain(&body.keys_b) {
        match store.exists(key).await {
            Ok(true) => {}
            Ok(false) => return errors::not_found(format!("File not found: {key}")),
            Err(e) => {
                error!("storage existence check failed: {e}");
                return errors::internal(e.to_string());
            }
        }
    }

    let job_id = JobId::new();
    services.jobs.create(job_id, JobType::Merge).await;

    let job = MergeJob {
        source: MergeSource::Stored {
            left: body.keys_a,
            right: body.keys_b,
        },
        join: body.join_type,
        left_key: body.left_key,
        right_key: body.right_key,
        selected_columns: body.selected_columns,
    };
    tokio::spawn(run_merge_job(services.clone(), job_id, job));

    (StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))).into_response()
}

/// GET /api/merge/r2/results/*key
pub async fn stored_result_url(
    Extension(services): Extension<Arc<AppServices>>,
    Path(key): Path<String>,
) -> axum::response::Response {
    let Some(store) = services.object_store.clone() else {
        return errors::unavailable("Object storage not available");
    };

    match store.exists(&key).await {
        Ok(true) => {}
        Ok(false) => return errors::not_found("Result not found"),
        Err(e) => return errors::internal(e.to_string()),
    }

    match store
        .presign_get(&key, std::time::Duration::from_secs(3600))
        .await
    {
        Ok(url) => Json(json!({ "downloadUrl": url })).into_response(),
        Err(e) => {
            error!("failed to presign download: {e}");
            errors::internal("Failed to generate download URL")
        }
    }
}
