//! Consistent error responses: `{"error": <message>}` plus a standard code.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": message.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, message)
}

pub fn not_found(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, message)
}

pub fn unavailable(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::SERVICE_UNAVAILABLE, message)
}

pub fn internal(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, message)
}
