use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "tabops-api",
    }))
}
