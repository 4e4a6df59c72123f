use listing_autofill::{
    app_state::AppState,
    config::AppConfig,
    db::{self, catalog_queries, queue_queries},
    services::{
        cache::AnalysisCache, confidence::ConfidenceCalculator, pipeline,
        provider::AnalysisProvider, storage::ImageStore, vision::VisionClient,
    },
};
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

/// How many idle poll intervals pass between maintenance sweeps.
const SWEEP_EVERY_TICKS: u64 = 10;

/// A `processing` item older than this is reclaimed by the stale sweep.
const STALE_AFTER_MINUTES: i64 = 10;

/// Terminal queue items are purged after this many days.
const RETENTION_DAYS: i64 = 7;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting listing-autofill worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let storage = ImageStore::new(
        &config.image_bucket,
        &config.image_endpoint,
        &config.image_access_key,
        &config.image_secret_key,
    )
    .expect("Failed to initialize image storage client");

    let cache = AnalysisCache::new(&config.redis_url).expect("Failed to initialize analysis cache");

    let vision = match (&config.vision_endpoint, &config.vision_api_key) {
        (Some(endpoint), Some(api_key)) if config.vision_enabled => Some(
            VisionClient::new(
                endpoint.clone(),
                api_key.clone(),
                Duration::from_secs(config.vision_timeout_secs),
            )
            .expect("Failed to initialize vision client"),
        ),
        _ => None,
    };
    let provider = AnalysisProvider::new(vision);

    let calculator = ConfidenceCalculator::load(&db_pool)
        .await
        .expect("Failed to load confidence weights");

    let catalog = catalog_queries::load_catalog(&db_pool)
        .await
        .expect("Failed to load category catalog");

    let state = AppState::new(
        db_pool,
        storage,
        cache,
        provider,
        calculator,
        catalog,
        config.max_attempts,
    );

    tracing::info!(
        batch_size = config.batch_size,
        poll_interval_secs = config.poll_interval_secs,
        remote_provider = state.provider.remote_enabled(),
        "Worker ready, starting processing loop"
    );

    let mut ticks: u64 = 0;

    // Main processing loop
    loop {
        match pipeline::process_pending_batch(&state, config.batch_size).await {
            Ok(report) if report.processed + report.errors > 0 => {
                tracing::info!(
                    processed = report.processed,
                    errors = report.errors,
                    "batch complete, checking for more work"
                );
            }
            Ok(_) => {
                tracing::trace!("no pending items, sleeping");
                sleep(Duration::from_secs(config.poll_interval_secs)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "batch processing error, will retry");
                sleep(Duration::from_secs(config.poll_interval_secs)).await;
            }
        }

        ticks += 1;
        if ticks % SWEEP_EVERY_TICKS == 0 {
            run_sweeps(&state).await;
            refresh_catalog(&state).await;
        }

        if let Ok(stats) = queue_queries::stats(&state.db).await {
            metrics::gauge!("autofill_queue_depth").set(stats.pending as f64);
        }
    }
}

/// Periodic maintenance: reclaim stale items, reset retry-eligible
/// failures, purge old terminal items.
async fn run_sweeps(state: &AppState) {
    match queue_queries::sweep_stale(&state.db, STALE_AFTER_MINUTES).await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(count = n, "reclaimed stale processing items"),
        Err(e) => tracing::error!(error = %e, "stale sweep failed"),
    }

    match queue_queries::sweep_retries(&state.db).await {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "reset failed items for retry"),
        Err(e) => tracing::error!(error = %e, "retry sweep failed"),
    }

    match queue_queries::sweep_cleanup(&state.db, RETENTION_DAYS).await {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "purged old terminal items"),
        Err(e) => tracing::error!(error = %e, "cleanup sweep failed"),
    }
}

/// Pick up catalog changes (new categories, keyword edits) without a
/// restart.
async fn refresh_catalog(state: &AppState) {
    match catalog_queries::load_catalog(&state.db).await {
        Ok(catalog) => {
            *state.catalog.write().await = catalog;
        }
        Err(e) => tracing::error!(error = %e, "catalog refresh failed"),
    }
}
