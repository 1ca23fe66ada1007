use tabops_api::config::Settings;

#[tokio::main]
async fn main() {
    tabops_observability::init();

    let settings = Settings::from_env();
    let port = settings.port;
    let app = tabops_api::app::build_app(settings).await;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|e| panic!("failed to bind 0.0.0.0:{port}: {e}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
