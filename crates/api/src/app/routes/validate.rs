//! Email-validation endpoints (synchronous small-batch, plus background jobs
//! over direct uploads or cloud storage).

use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path, Query},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::error;

use tabops_core::{JobId, JobType};

use crate::app::routes::merge::{fresh_upload_key, parse_dataset, read_multipart_file};
use crate::app::workers::validate::{run_validation_job, ValidationSource};
use crate::app::{dto, errors, AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/validate", post(validate_domains))
        .route("/upload-url", post(upload_url))
        .route("/preview", post(preview_stored_file))
        .route("/jobs", post(create_stored_job))
        .route("/jobs/:id", get(job_status))
        .route("/validate-file", post(create_inline_job))
        .route("/results/*key", get(result_url))
        .route("/download/:id", get(download_result))
}

/// POST /api/validate/validate
///
/// Synchronous MX check for a small batch of domains.
pub async fn validate_domains(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ValidateRequest>,
) -> axum::response::Response {
    let results = services.mx.validate_domains(&body.domains).await;
    Json(json!({ "results": results })).into_response()
}

/// POST /api/validate/upload-url
pub async fn upload_url(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::UploadUrlParams>,
) -> axum::response::Response {
    let Some(store) = services.object_store.clone() else {
        return errors::unavailable("Object storage not available");
    };

    let key = fresh_upload_key("email-validation", &params.filename);
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

/// POST /api/validate/preview
///
/// Columns and a small preview of a stored file, so the client can pick the
/// email column before starting a job.
pub async fn preview_stored_file(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StoredFileRequest>,
) -> axum::response::Response {
    let Some(store) = services.object_store.clone() else {
        return errors::unavailable("Object storage not available");
    };

    let bytes = match store.get(&body.key).await {
        Ok(bytes) => bytes,
        Err(_) => return errors::not_found("File not found"),
    };

    match parse_dataset(body.key.clone(), bytes.to_vec()).await {
        Ok(dataset) => Json(json!({
            "columns": dataset.columns(),
            "rowCount": dataset.row_count(),
            "preview": dataset.preview(5),
        }))
        .into_response(),
        Err(response) => response,
    }
}

/// POST /api/validate/jobs
///
/// Background validation of a cloud-stored file. The key is checked before
/// the job record exists, so a doomed request never creates a job.
pub async fn create_stored_job(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ValidationJobRequest>,
) -> axum::response::Response {
    let Some(store) = services.object_store.clone() else {
        return errors::unavailable("Object storage not available");
    };
    if body.email_column.trim().is_empty() {
        return errors::bad_request("emailColumn is required");
    }

    match store.exists(&body.key).await {
        Ok(true) => {}
        Ok(false) => return errors::not_found("File not found in storage"),
        Err(e) => {
            error!("storage existence check failed: {e}");
            return errors::internal(e.to_string());
        }
    }

    let job_id = JobId::new();
    services.jobs.create(job_id, JobType::EmailValidation).await;
    tokio::spawn(run_validation_job(
        services.clone(),
        job_id,
        ValidationSource::Stored { key: body.key },
        body.email_column,
    ));

    (StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))).into_response()
}

/// POST /api/validate/validate-file
///
/// Background validation of a directly-uploaded file (multipart `file` part
/// plus an `email_column` form field).
pub async fn create_inline_job(
    Extension(services): Extension<Arc<AppServices>>,
    mut multipart: Multipart,
) -> axum::response::Response {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut email_column: Option<String> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => match field.name() {
                Some("file") => {
                    let name = field.file_name().unwrap_or("file.csv").to_string();
                    match field.bytes().await {
                        Ok(bytes) => file = Some((name, bytes.to_vec())),
                        Err(e) => {
                            return errors::bad_request(format!("failed to read upload: {e}"))
                        }
                    }
                }
                Some("email_column") => match field.text().await {
                    Ok(text) => email_column = Some(text),
                    Err(e) => {
                        return errors::bad_request(format!("failed to read email_column: {e}"))
                    }
                },
                _ => {}
            },
            Ok(None) => break,
            Err(e) => return errors::bad_request(format!("malformed multipart body: {e}")),
        }
    }

    let Some((filename, bytes)) = file else {
        return errors::bad_request("No file selected");
    };
    let Some(email_column) = email_column.filter(|c| !c.trim().is_empty()) else {
        return errors::bad_request("email_column is required");
    };

    let job_id = JobId::new();
    services.jobs.create(job_id, JobType::EmailValidation).await;
    tokio::spawn(run_validation_job(
        services.clone(),
        job_id,
        ValidationSource::Inline { filename, bytes },
        email_column,
    ));

    (StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))).into_response()
}

/// GET /api/validate/jobs/:id
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

/// GET /api/validate/results/*key
///
/// Presigned URL for downloading stored validation results.
pub async fn result_url(
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

/// GET /api/validate/download/:id
///
/// Download results produced by the direct-upload workflow.
pub async fn download_result(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(job_id) = id.parse::<JobId>() else {
        return errors::not_found("Results not found or expired");
    };
    let path = services.files.result_path(&format!("{job_id}.csv"));
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=email-validation-{job_id}.csv"),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => errors::not_found("Results not found or expired"),
    }
}
