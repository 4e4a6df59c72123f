use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{queue_queries, suggestion_queries};
use crate::models::analysis::AnalysisResult;
use crate::models::queue::{ProcessingType, QueueItem, QueueStatus};
use crate::models::suggestion::{AggregatedSuggestion, Suggestion, SuggestionType, UserFeedback};
use crate::services::aggregate::{self, AggregationEmpty};
use crate::services::cache;
use crate::services::provider::{AnalysisError, AnalysisOptions};
use crate::services::storage::StorageError;

/// An image submitted through the interactive auto-fill flow.
pub struct UploadedImage {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Outcome of one queue item in a worker batch.
#[derive(Debug, Serialize)]
pub struct ItemOutcome {
    pub item_id: Uuid,
    pub image_id: Uuid,
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one worker batch.
#[derive(Debug, Serialize, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub errors: usize,
    pub details: Vec<ItemOutcome>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    NoUsableImages(#[from] AggregationEmpty),

    #[error(transparent)]
    InvalidImage(#[from] AnalysisError),

    #[error("suggestion not found")]
    SuggestionNotFound,

    #[error("image download failed: {0}")]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Analyze one image end to end: content-hash cache lookup, provider call,
/// suggestion derivation and confidence scoring, cache write-back. Cache
/// failures degrade to a miss; only unreadable bytes and database failures
/// are errors.
pub async fn analyze_image(
    state: &AppState,
    image_bytes: &[u8],
    opts: &AnalysisOptions,
) -> Result<AnalysisResult, PipelineError> {
    let content_hash = cache::content_hash(image_bytes);

    match state.cache.get_analysis(&content_hash).await {
        Ok(Some(cached)) => {
            metrics::counter!("autofill_cache_hits_total").increment(1);
            tracing::debug!(content_hash = %content_hash, "analysis cache hit");
            return Ok(cached);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "analysis cache read failed, treating as miss");
        }
    }

    let start = std::time::Instant::now();
    let mut result = state.provider.analyze(image_bytes, opts).await?;

    {
        let calculator = state.calculator.read().await;
        let catalog = state.catalog.read().await;
        crate::services::provider::derive_suggestions(
            &state.db,
            &calculator,
            &catalog,
            &mut result,
        )
        .await?;
    }

    metrics::histogram!("autofill_analysis_seconds").record(start.elapsed().as_secs_f64());

    if let Err(e) = state.cache.put_analysis(&content_hash, &result).await {
        tracing::warn!(error = %e, "analysis cache write failed");
    }

    Ok(result)
}

/// Interactive auto-fill: analyze up to 5 images sequentially within the
/// request, aggregate, and persist the aggregated fields as suggestions.
/// Individual unreadable images are skipped; only a batch where nothing was
/// usable is an error.
pub async fn submit_images_for_autofill(
    state: &AppState,
    article_id: Uuid,
    images: Vec<UploadedImage>,
) -> Result<AggregatedSuggestion, PipelineError> {
    let mut results = Vec::new();

    for (index, image) in images.iter().enumerate() {
        let opts = AnalysisOptions {
            filename: image.filename.clone(),
        };

        match analyze_image(state, &image.bytes, &opts).await {
            Ok(result) => results.push(result),
            Err(PipelineError::InvalidImage(e)) => {
                tracing::warn!(image_index = index, error = %e, "skipping unreadable image");
            }
            Err(e) => return Err(e),
        }
    }

    let aggregated = aggregate::aggregate(&results)?;
    persist_aggregate_suggestions(state, article_id, None, &aggregated).await?;

    Ok(aggregated)
}

/// Claim and process one batch of pending queue items. Returns a report of
/// per-item outcomes; item errors are recorded on the item, never raised.
pub async fn process_pending_batch(
    state: &AppState,
    batch_size: i64,
) -> Result<BatchReport, sqlx::Error> {
    let items = queue_queries::claim_pending_batch(&state.db, batch_size).await?;
    let mut report = BatchReport::default();

    for item in items {
        tracing::info!(
            item_id = %item.id,
            image_id = %item.image_id,
            processing_type = %item.processing_type,
            attempt = item.attempts,
            "processing queue item"
        );

        match process_queue_item(state, &item).await {
            Ok(result) => {
                let result_json = serde_json::to_value(&result).ok();
                queue_queries::mark_completed(&state.db, item.id, result_json).await?;
                metrics::counter!("autofill_queue_processed_total").increment(1);

                report.processed += 1;
                report.details.push(ItemOutcome {
                    item_id: item.id,
                    image_id: item.image_id,
                    status: QueueStatus::Completed,
                    error: None,
                });
            }
            Err(e) => {
                tracing::error!(item_id = %item.id, error = %e, "queue item failed");
                queue_queries::mark_failed(&state.db, item.id, &e.to_string()).await?;
                metrics::counter!("autofill_queue_failed_total").increment(1);

                report.errors += 1;
                report.details.push(ItemOutcome {
                    item_id: item.id,
                    image_id: item.image_id,
                    status: QueueStatus::Failed,
                    error: Some(e.to_string()),
                });
            }
        }

        // Aggregation trigger: once every queue item of the article has
        // reached a terminal state, merge its completed analyses.
        if let Some(article_id) = item.article_id {
            if !queue_queries::article_has_open_items(&state.db, article_id).await? {
                if let Err(e) = aggregate_article(state, article_id).await {
                    tracing::error!(article_id = %article_id, error = %e, "article aggregation failed");
                }
            }
        }
    }

    Ok(report)
}

/// Process a single claimed item: fetch bytes, analyze, and for
/// categorization items refresh the short-lived derived-category cache.
async fn process_queue_item(
    state: &AppState,
    item: &QueueItem,
) -> Result<AnalysisResult, PipelineError> {
    let image_bytes = state.storage.download(item.image_id).await?;

    let result = analyze_image(state, &image_bytes, &AnalysisOptions::default()).await?;

    if item.processing_type == ProcessingType::Categorization {
        if let Some(category_id) = result.suggested_category {
            let hash = cache::content_hash(&image_bytes);
            if let Err(e) = state.cache.put_category(&hash, category_id).await {
                tracing::warn!(error = %e, "category cache write failed");
            }
        }
    }

    Ok(result)
}

/// Merge all completed analyses of an article and persist the aggregated
/// fields as article-level suggestions.
async fn aggregate_article(state: &AppState, article_id: Uuid) -> Result<(), PipelineError> {
    let rows = queue_queries::completed_results_for_article(&state.db, article_id).await?;

    let results: Vec<AnalysisResult> = rows
        .into_iter()
        .filter_map(|(image_id, json)| match serde_json::from_value(json) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(image_id = %image_id, error = %e, "stored analysis unreadable, skipping");
                None
            }
        })
        .collect();

    if results.is_empty() {
        tracing::warn!(article_id = %article_id, "no completed analyses to aggregate");
        return Ok(());
    }

    let aggregated = aggregate::aggregate(&results)?;
    persist_aggregate_suggestions(state, article_id, None, &aggregated).await?;

    tracing::info!(
        article_id = %article_id,
        images = aggregated.image_count,
        overall_confidence = aggregated.overall_confidence,
        "article suggestions aggregated"
    );

    Ok(())
}

/// One suggestion row per derived field.
async fn persist_aggregate_suggestions(
    state: &AppState,
    article_id: Uuid,
    image_id: Option<Uuid>,
    aggregated: &AggregatedSuggestion,
) -> Result<Vec<Suggestion>, sqlx::Error> {
    let confidence = aggregated.overall_confidence;
    let mut stored = Vec::new();

    stored.push(
        suggestion_queries::insert_suggestion(
            &state.db,
            article_id,
            image_id,
            SuggestionType::Title,
            &aggregated.title,
            confidence,
            None,
        )
        .await?,
    );

    stored.push(
        suggestion_queries::insert_suggestion(
            &state.db,
            article_id,
            image_id,
            SuggestionType::Description,
            &aggregated.description,
            confidence,
            None,
        )
        .await?,
    );

    if let Some(category_id) = aggregated.category_id {
        stored.push(
            suggestion_queries::insert_suggestion(
                &state.db,
                article_id,
                image_id,
                SuggestionType::Category,
                &category_id.to_string(),
                confidence,
                Some(category_id),
            )
            .await?,
        );
    }

    if let Some(price) = aggregated.price {
        stored.push(
            suggestion_queries::insert_suggestion(
                &state.db,
                article_id,
                image_id,
                SuggestionType::Price,
                &format!("{price:.2}"),
                confidence,
                aggregated.category_id,
            )
            .await?,
        );
    }

    if let Some(condition) = aggregated.condition {
        stored.push(
            suggestion_queries::insert_suggestion(
                &state.db,
                article_id,
                image_id,
                SuggestionType::Condition,
                &condition.to_string(),
                confidence,
                None,
            )
            .await?,
        );
    }

    Ok(stored)
}

/// Persist user feedback and run the learning nudge exactly once per
/// suggestion. Duplicate feedback updates the stored value but leaves the
/// learned weight untouched.
pub async fn record_suggestion_feedback(
    state: &AppState,
    suggestion_id: Uuid,
    feedback: UserFeedback,
    modified_value: Option<&str>,
) -> Result<Suggestion, PipelineError> {
    let Some((suggestion, first_time)) =
        suggestion_queries::record_feedback(&state.db, suggestion_id, feedback, modified_value)
            .await?
    else {
        return Err(PipelineError::SuggestionNotFound);
    };

    if first_time {
        let new_weight = {
            let mut calculator = state.calculator.write().await;
            calculator.apply_feedback(suggestion.suggestion_type, feedback)
        };
        suggestion_queries::save_weight(&state.db, suggestion.suggestion_type, new_weight).await?;

        tracing::info!(
            suggestion_id = %suggestion_id,
            suggestion_type = %suggestion.suggestion_type,
            feedback = %feedback,
            new_weight = new_weight,
            "feedback applied to confidence weights"
        );
    } else {
        tracing::debug!(
            suggestion_id = %suggestion_id,
            "duplicate feedback, learning step skipped"
        );
    }

    Ok(suggestion)
}
