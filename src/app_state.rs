use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::catalog::CategoryCatalog;
use crate::services::{
    cache::AnalysisCache, confidence::ConfidenceCalculator, provider::AnalysisProvider,
    storage::ImageStore,
};

/// Shared application state passed to all route handlers and the worker.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<ImageStore>,
    pub cache: Arc<AnalysisCache>,
    pub provider: Arc<AnalysisProvider>,
    /// Learned confidence weights; mutated only by the feedback path.
    pub calculator: Arc<RwLock<ConfidenceCalculator>>,
    /// Category catalog snapshot; refreshed by the worker.
    pub catalog: Arc<RwLock<CategoryCatalog>>,
    /// Max processing attempts assigned to newly enqueued items.
    pub max_attempts: i32,
}

impl AppState {
    pub fn new(
        db: PgPool,
        storage: ImageStore,
        cache: AnalysisCache,
        provider: AnalysisProvider,
        calculator: ConfidenceCalculator,
        catalog: CategoryCatalog,
        max_attempts: i32,
    ) -> Self {
        Self {
            db,
            storage: Arc::new(storage),
            cache: Arc::new(cache),
            provider: Arc::new(provider),
            calculator: Arc::new(RwLock::new(calculator)),
            catalog: Arc::new(RwLock::new(catalog)),
            max_attempts,
        }
    }
}
