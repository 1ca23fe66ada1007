//! HTTP application wiring (Axum router + service wiring).
//!
//! Layout:
//! - `services.rs`: infrastructure wiring (job manager, cache, object store,
//!   enrichment clients)
//! - `routes/`: HTTP routes + handlers (one file per surface)
//! - `workers/`: background job bodies (one file per job type)
//! - `dto.rs`: request DTOs and shared enums
//! - `errors.rs`: consistent error responses
//! - `sessions.rs`: research session store

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Extension, Router};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::config::Settings;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;
pub mod sessions;
pub mod workers;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(settings: Settings) -> Router {
    let services = Arc::new(services::build_services(settings).await);
    router(services)
}

/// Router over already-built services (integration tests reuse this to wire
/// mock endpoints and temp directories).
pub fn router(services: Arc<AppServices>) -> Router {
    let body_limit = DefaultBodyLimit::max(services.settings.max_upload_size_bytes());
    let cors = cors_layer(&services.settings);

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/merge", routes::merge::router())
        .nest("/api/validate", routes::validate::router())
        .nest("/api/research", routes::research::router())
        .layer(Extension(services))
        .layer(body_limit)
        .layer(cors)
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}
