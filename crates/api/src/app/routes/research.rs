//! Research endpoints: session upload, batched research runs, progress
//! polling, stop, history.

use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path, Query},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;

use tabops_core::{JobId, JobType, SessionId};
use tabops_enrich::research::field_types;

use crate::app::dto::ResearchType;
use crate::app::workers::research::{run_research_job, ResearchJob};
use crate::app::{dto, errors, AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/field-types", get(get_field_types))
        .route("/upload", post(upload_csv))
        .route("/run", post(run_research))
        .route("/progress", get(get_progress))
        .route("/results", get(get_results))
        .route("/stop", post(stop_research))
        .route("/jobs/:id", get(job_status).delete(delete_job))
        .route("/download/:filename", get(download_results))
        .route("/history", get(get_history))
        .route("/runs", delete(delete_runs))
}

/// GET /api/research/field-types
pub async fn get_field_types() -> axum::response::Response {
    let mut body = serde_json::Map::new();
    for (name, description) in field_types() {
        body.insert(name.to_string(), json!(description));
    }
    Json(serde_json::Value::Object(body)).into_response()
}

/// POST /api/research/upload
///
/// Parse a CSV of entities into a new session. The returned session id is
/// mandatory on every subsequent research call.
pub async fn upload_csv(
    Extension(services): Extension<Arc<AppServices>>,
    mut multipart: Multipart,
) -> axum::response::Response {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut has_header = false;
    let mut research_type = ResearchType::default();

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => match field.name() {
                Some("csv_file") => {
                    let name = field.file_name().unwrap_or_default().to_string();
                    match field.bytes().await {
                        Ok(bytes) => file = Some((name, bytes.to_vec())),
                        Err(e) => {
                            return errors::bad_request(format!("failed to read upload: {e}"))
                        }
                    }
                }
                Some("has_header") => {
                    has_header = matches!(field.text().await.as_deref(), Ok("yes"));
                }
                Some("research_type") => {
                    if let Ok(text) = field.text().await {
                        research_type = match text.as_str() {
                            "structured" => ResearchType::Structured,
                            "company" => ResearchType::Company,
                            "contact" => ResearchType::Contact,
                            other => {
                                return errors::bad_request(format!(
                                    "unknown research type: {other}"
                                ))
                            }
                        };
                    }
                }
                _ => {}
            },
            Ok(None) => break,
            Err(e) => return errors::bad_request(format!("malformed multipart body: {e}")),
        }
    }

    let Some((file_name, bytes)) = file else {
        return errors::bad_request("No file selected");
    };
    if !file_name.to_ascii_lowercase().ends_with(".csv") {
        return errors::bad_request("File must be a CSV");
    }

    let mut rows = match tabops_tabular::io::read_csv_rows(&bytes) {
        Ok(rows) => rows,
        Err(e) => return errors::bad_request(format!("Error processing CSV: {e}")),
    };
    if rows.is_empty() {
        return errors::bad_request("CSV file is empty");
    }
    if has_header {
        rows.remove(0);
    }

    let total_rows = rows.len();
    let sample: Vec<Vec<String>> = rows.iter().take(5).cloned().collect();
    let session_id = services
        .sessions
        .insert(rows, research_type.as_str().to_string())
        .await;

    Json(json!({
        "sessionId": session_id,
        "totalRows": total_rows,
        "sampleData": sample,
        "hasHeader": has_header,
    }))
    .into_response()
}

/// POST /api/research/run
///
/// Create a research job over an uploaded session and return immediately.
/// The spawned task is registered for cancellation; this is the one job
/// type with a cancellation path.
pub async fn run_research(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RunResearchRequest>,
) -> axum::response::Response {
    let Ok(session_id) = body.session_id.parse::<SessionId>() else {
        return errors::not_found("Session not found");
    };
    if !services.sessions.contains(session_id).await {
        return errors::not_found("Session not found");
    }

    let fields = body.fields.unwrap_or_default();
    match body.research_type {
        ResearchType::Structured => {
            if fields.is_empty() {
                return errors::bad_request("At least one output field is required");
            }
            if services.research.is_none() {
                return errors::unavailable("Research API not configured");
            }
        }
        ResearchType::Company => {
            if services.company.is_none() {
                return errors::unavailable("Company enrichment API not configured");
            }
        }
        ResearchType::Contact => {
            if services.contact.is_none() {
                return errors::unavailable("Contact enrichment API not configured");
            }
        }
    }

    let job_id = JobId::new();
    services.jobs.create(job_id, JobType::Research).await;

    let job = ResearchJob {
        session_id,
        research_type: body.research_type,
        fields,
    };
    let handle = tokio::spawn(run_research_job(services.clone(), job_id, job));
    services.jobs.register_task(job_id, handle);

    (
        StatusCode::ACCEPTED,
        Json(json!({ "jobId": job_id, "sessionId": session_id })),
    )
        .into_response()
}

/// GET /api/research/progress?session_id=...
pub async fn get_progress(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SessionQuery>,
) -> axum::response::Response {
    let Ok(session_id) = query.session_id.parse::<SessionId>() else {
        return errors::not_found("Session not found");
    };
    match services.sessions.progress(session_id).await {
        Some(progress) => Json(progress).into_response(),
        None => errors::not_found("Session not found"),
    }
}

/// GET /api/research/results?session_id=...&offset=N
pub async fn get_results(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SessionQuery>,
) -> axum::response::Response {
    let Ok(session_id) = query.session_id.parse::<SessionId>() else {
        return errors::not_found("Session not found");
    };
    match services.sessions.results_from(session_id, query.offset).await {
        Some((results, total)) => Json(json!({
            "results": results,
            "total": total,
        }))
        .into_response(),
        None => errors::not_found("Session not found"),
    }
}

/// POST /api/research/stop
pub async fn stop_research(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StopRequest>,
) -> axum::response::Response {
    let Ok(session_id) = body.session_id.parse::<SessionId>() else {
        return errors::not_found("Session not found");
    };
    if services.sessions.request_stop(session_id).await {
        Json(json!({ "success": true, "message": "Stop requested" })).into_response()
    } else {
        Json(json!({ "success": false, "message": "No active research run" })).into_response()
    }
}

/// GET /api/research/jobs/:id
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

/// DELETE /api/research/jobs/:id
///
/// Remove the record and abort the registered task if it still runs.
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

/// GET /api/research/download/:filename
pub async fn download_results(
    Extension(services): Extension<Arc<AppServices>>,
    Path(filename): Path<String>,
) -> axum::response::Response {
    // Results are flat files; reject anything path-shaped.
    if filename.contains('/') || filename.contains("..") {
        return errors::bad_request("Invalid filename");
    }
    let path = services.files.result_path(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename={filename}"),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => errors::not_found("File not found"),
    }
}

/// GET /api/research/history
pub async fn get_history(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let runs = services.history.load().await;
    Json(json!({
        "runs": runs,
        "cacheStats": {
            "mirrorEnabled": services.cache.mirror_enabled(),
            "bucket": services
                .cache
                .mirror_enabled()
                .then(|| services.settings.s3.bucket.clone()),
        },
    }))
    .into_response()
}

/// DELETE /api/research/runs
pub async fn delete_runs(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::DeleteRunsRequest>,
) -> axum::response::Response {
    if body.ids.is_empty() {
        return errors::bad_request("No IDs provided");
    }
    let deleted = services.history.delete(&body.ids).await;
    Json(json!({ "success": true, "deletedCount": deleted })).into_response()
}
