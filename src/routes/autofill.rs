use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{queue_queries, suggestion_queries};
use crate::models::queue::QueueStats;
use crate::models::suggestion::{
    AggregatedSuggestion, EnqueueRequest, EnqueueResponse, FeedbackRequest, Suggestion,
};
use crate::services::pipeline::{self, BatchReport, PipelineError, UploadedImage};

/// Interactive auto-fill accepts at most this many images per request.
const MAX_INTERACTIVE_IMAGES: usize = 5;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn map_pipeline_error(e: PipelineError) -> (StatusCode, Json<ErrorBody>) {
    match e {
        PipelineError::NoUsableImages(_) => {
            error_response(StatusCode::BAD_REQUEST, "no images could be processed")
        }
        PipelineError::InvalidImage(e) => {
            error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
        }
        PipelineError::SuggestionNotFound => {
            error_response(StatusCode::NOT_FOUND, "suggestion not found")
        }
        PipelineError::Storage(e) => {
            tracing::error!(error = %e, "storage failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
        PipelineError::Db(e) => {
            tracing::error!(error = %e, "database failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AutofillResponse {
    pub article_id: Uuid,
    pub suggestion: AggregatedSuggestion,
}

/// POST /api/v1/autofill — upload up to 5 item photos and receive an
/// aggregated listing suggestion within the request.
pub async fn submit_autofill(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AutofillResponse>, (StatusCode, Json<ErrorBody>)> {
    let mut article_id: Option<Uuid> = None;
    let mut images: Vec<UploadedImage> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "malformed multipart body"))?
    {
        match field.name() {
            Some("article_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| error_response(StatusCode::BAD_REQUEST, "unreadable article_id"))?;
                let id = text.parse().map_err(|_| {
                    error_response(StatusCode::BAD_REQUEST, "article_id is not a UUID")
                })?;
                article_id = Some(id);
            }
            Some("images") => {
                if images.len() == MAX_INTERACTIVE_IMAGES {
                    return Err(error_response(
                        StatusCode::BAD_REQUEST,
                        format!("at most {MAX_INTERACTIVE_IMAGES} images per request"),
                    ));
                }
                let filename = field.file_name().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| error_response(StatusCode::BAD_REQUEST, "unreadable image field"))?;
                images.push(UploadedImage {
                    filename,
                    bytes: data.to_vec(),
                });
            }
            _ => {}
        }
    }

    if images.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "no images supplied"));
    }

    let article_id = article_id.unwrap_or_else(Uuid::new_v4);

    let suggestion = pipeline::submit_images_for_autofill(&state, article_id, images)
        .await
        .map_err(map_pipeline_error)?;

    Ok(Json(AutofillResponse {
        article_id,
        suggestion,
    }))
}

/// POST /api/v1/analysis/enqueue — queue images for background analysis.
pub async fn enqueue_analysis(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, (StatusCode, Json<ErrorBody>)> {
    request
        .validate()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    let count_added = queue_queries::enqueue_items(
        &state.db,
        &request.image_ids,
        request.article_id,
        request.processing_type,
        request.priority,
        state.max_attempts,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "enqueue failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    })?;

    Ok(Json(EnqueueResponse { count_added }))
}

#[derive(Debug, Deserialize, Default)]
pub struct ProcessRequest {
    pub batch_size: Option<i64>,
}

/// POST /api/v1/analysis/queue/process — drain one batch on demand.
/// Primarily for operators; the worker daemon runs the same function on a
/// schedule.
pub async fn process_queue(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<BatchReport>, (StatusCode, Json<ErrorBody>)> {
    let batch_size = request.batch_size.unwrap_or(10).clamp(1, 10);

    let report = pipeline::process_pending_batch(&state, batch_size)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "queue processing failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        })?;

    Ok(Json(report))
}

/// GET /api/v1/analysis/queue/stats — queue statistics for operators.
pub async fn queue_stats(
    State(state): State<AppState>,
) -> Result<Json<QueueStats>, (StatusCode, Json<ErrorBody>)> {
    let stats = queue_queries::stats(&state.db).await.map_err(|e| {
        tracing::error!(error = %e, "queue stats failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    })?;

    Ok(Json(stats))
}

/// POST /api/v1/suggestions/{id}/feedback — record user feedback on a
/// suggestion and update the learned weights (once per suggestion).
pub async fn suggestion_feedback(
    State(state): State<AppState>,
    Path(suggestion_id): Path<Uuid>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Suggestion>, (StatusCode, Json<ErrorBody>)> {
    request
        .validate()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    let suggestion = pipeline::record_suggestion_feedback(
        &state,
        suggestion_id,
        request.feedback,
        request.modified_value.as_deref(),
    )
    .await
    .map_err(map_pipeline_error)?;

    Ok(Json(suggestion))
}

/// GET /api/v1/articles/{id}/suggestions — suggestions for one article.
pub async fn article_suggestions(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<Vec<Suggestion>>, (StatusCode, Json<ErrorBody>)> {
    let suggestions = suggestion_queries::suggestions_for_article(&state.db, article_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "suggestion lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        })?;

    Ok(Json(suggestions))
}
