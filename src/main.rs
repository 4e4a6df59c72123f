mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{
    cache::AnalysisCache, confidence::ConfidenceCalculator, provider::AnalysisProvider,
    storage::ImageStore, vision::VisionClient,
};

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

    tracing::info!("Initializing listing-autofill server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "autofill_analysis_seconds",
        "Time to analyze one image, including derivation and scoring"
    );
    metrics::describe_counter!(
        "autofill_analysis_remote_total",
        "Analyses served by the remote vision provider"
    );
    metrics::describe_counter!(
        "autofill_analysis_fallback_total",
        "Analyses served by the local fallback"
    );
    metrics::describe_counter!(
        "autofill_cache_hits_total",
        "Analyses answered from the content-hash cache"
    );
    metrics::describe_counter!(
        "autofill_queue_processed_total",
        "Queue items processed successfully"
    );
    metrics::describe_counter!(
        "autofill_queue_failed_total",
        "Queue items that failed processing"
    );
    metrics::describe_gauge!(
        "autofill_queue_depth",
        "Current number of pending items in the processing queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize image storage client
    tracing::info!("Initializing image storage client");
    let storage = ImageStore::new(
        &config.image_bucket,
        &config.image_endpoint,
        &config.image_access_key,
        &config.image_secret_key,
    )
    .expect("Failed to initialize image storage client");

    // Initialize Redis analysis cache
    tracing::info!("Connecting to Redis analysis cache");
    let cache = AnalysisCache::new(&config.redis_url).expect("Failed to initialize analysis cache");

    // Initialize the analysis provider (remote vision client optional)
    let vision = match (&config.vision_endpoint, &config.vision_api_key) {
        (Some(endpoint), Some(api_key)) if config.vision_enabled => {
            tracing::info!("Remote vision provider enabled");
            Some(
                VisionClient::new(
                    endpoint.clone(),
                    api_key.clone(),
                    Duration::from_secs(config.vision_timeout_secs),
                )
                .expect("Failed to initialize vision client"),
            )
        }
        _ => {
            tracing::info!("Remote vision provider disabled, using local fallback only");
            None
        }
    };
    let provider = AnalysisProvider::new(vision);

    // Load learned confidence weights and the category catalog
    tracing::info!("Loading confidence weights");
    let calculator = ConfidenceCalculator::load(&db_pool)
        .await
        .expect("Failed to load confidence weights");

    tracing::info!("Loading category catalog");
    let catalog = db::catalog_queries::load_catalog(&db_pool)
        .await
        .expect("Failed to load category catalog");

    // Create shared application state
    let state = AppState::new(
        db_pool,
        storage,
        cache,
        provider,
        calculator,
        catalog,
        config.max_attempts,
    );

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/autofill", post(routes::autofill::submit_autofill))
        .route(
            "/api/v1/analysis/enqueue",
            post(routes::autofill::enqueue_analysis),
        )
        .route(
            "/api/v1/analysis/queue/process",
            post(routes::autofill::process_queue),
        )
        .route(
            "/api/v1/analysis/queue/stats",
            get(routes::autofill::queue_stats),
        )
        .route(
            "/api/v1/suggestions/{suggestion_id}/feedback",
            post(routes::autofill::suggestion_feedback),
        )
        .route(
            "/api/v1/articles/{article_id}/suggestions",
            get(routes::autofill::article_suggestions),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(30 * 1024 * 1024)); // 5 images, ~6 MB each

    tracing::info!("Starting listing-autofill on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
