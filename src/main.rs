use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ocr_gateway::app_state::AppState;
use ocr_gateway::config::AppConfig;
use ocr_gateway::engines;
use ocr_gateway::registry::breaker::CircuitBreaker;
use ocr_gateway::registry::EngineRegistry;
use ocr_gateway::routes;
use ocr_gateway::services::{dispatch::Dispatcher, store::JobStore};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing ocr-gateway server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "ocr_processing_seconds",
        "Time spent recognizing a document, per engine"
    );
    metrics::describe_counter!(
        "ocr_sync_requests_total",
        "Synchronous recognition requests by outcome"
    );
    metrics::describe_counter!("ocr_jobs_total", "Total recognition jobs submitted");
    metrics::describe_counter!("ocr_jobs_completed", "Total recognition jobs completed");
    metrics::describe_counter!("ocr_jobs_failed", "Total recognition jobs that failed");
    metrics::describe_gauge!(
        "ocr_queue_depth",
        "Current number of pending jobs in the store"
    );

    // Discover engines from the built-in registration list
    tracing::info!("Discovering recognition engines");
    let breaker = CircuitBreaker::new(config.breaker());
    let registry = EngineRegistry::discover(
        engines::builtin_registrations(&config),
        config.strict_discovery,
        breaker,
    )
    .expect("Engine discovery failed");
    let registry = Arc::new(registry);

    // Initialize the Redis job store
    tracing::info!("Connecting to Redis job store");
    let store = JobStore::new(&config.redis_url).expect("Failed to initialize job store");

    let dispatcher = Dispatcher::new(Arc::clone(&registry), config.sync_timeout());

    // The async path accepts larger documents than the sync path; the body
    // limit covers the larger of the two plus multipart overhead.
    let body_limit = (config.async_limit_bytes as usize) + 1024 * 1024;
    let bind_addr = config.bind_addr.clone();

    // Create shared application state
    let state = AppState::new(registry, dispatcher, store, config);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/process", post(routes::process::process_document))
        .route("/api/v1/jobs", post(routes::jobs::submit_job))
        .route("/api/v1/jobs/{job_id}", get(routes::jobs::get_job_status))
        .route(
            "/api/v1/jobs/{job_id}/result",
            get(routes::jobs::get_job_result),
        )
        .route("/api/v1/engines", get(routes::engines::list_engines))
        .route("/api/v1/engines/{name}", get(routes::engines::engine_detail))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(body_limit));

    tracing::info!("Starting ocr-gateway on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
