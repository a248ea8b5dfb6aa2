mod circuit_breaker;
mod config;
mod db;
mod dispatch;
mod errors;
mod google_ads;
mod handlers;
mod identity;
mod meta_capi;
mod models;
mod payload;
mod storage;
mod validation;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::google_ads::GoogleAdsClient;
use crate::meta_capi::MetaCapiClient;

/// Serves the OpenAPI specification YAML file.
///
/// Reads `openapi.yml` from the filesystem and serves it with the
/// appropriate content type. If the file is not found, returns a 404 error.
async fn serve_openapi_spec() -> impl IntoResponse {
    match tokio::fs::read_to_string("openapi.yml").await {
        Ok(content) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/yaml")],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "OpenAPI spec not found").into_response(),
    }
}

/// Serves the Swagger UI HTML page, configured to load the OpenAPI
/// specification served by `serve_openapi_spec`.
async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Conversions API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

/// Main entry point for the application.
///
/// Initializes:
/// - Logging and tracing.
/// - Configuration loading (platform credentials resolved once, here).
/// - Optional database connection for the dispatch audit log.
/// - The two platform adapters.
/// - HTTP routes and middleware (CORS, rate limiting, body limits).
///
/// Then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conversions_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Optional database pool: audit storage only, never required for dispatch
    let db = match &config.database_url {
        Some(url) => {
            let database = Database::new(url).await?;
            tracing::info!("Database connection pool established");
            Some(database.pool)
        }
        None => None,
    };

    // Platform adapters, credentials injected once at startup
    let google_ads = Arc::new(GoogleAdsClient::new(
        config.google_ads.clone(),
        config.default_country_code.clone(),
    ));
    let meta_capi = Arc::new(MetaCapiClient::new(
        config.meta.clone(),
        config.default_country_code.clone(),
    ));

    // Duplicate-submission guard: 5 minute TTL covers double-click resubmits
    // without interfering with genuinely new transactions
    let recent_transactions_cache = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();
    tracing::info!("Transaction deduplication cache initialized");

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        config: config.clone(),
        db,
        google_ads,
        meta_capi,
        recent_transactions_cache,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // API Documentation
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(serve_openapi_spec))
        // Conversion dispatch endpoint
        .route(
            "/api/v1/conversions",
            post(handlers::dispatch_conversion_handler),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload (conversion requests are small)
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
