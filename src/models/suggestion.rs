use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::catalog::ItemCondition;

/// The listing fields the pipeline can propose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuggestionType {
    Title,
    Description,
    Category,
    Price,
    Condition,
}

impl SuggestionType {
    pub const ALL: [SuggestionType; 5] = [
        SuggestionType::Title,
        SuggestionType::Description,
        SuggestionType::Category,
        SuggestionType::Price,
        SuggestionType::Condition,
    ];
}

/// User verdict on a suggestion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserFeedback {
    Accepted,
    Rejected,
    Modified,
}

/// A single proposed listing field with its confidence, subject to user
/// accept/reject/modify feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: Uuid,
    pub article_id: Uuid,
    pub image_id: Option<Uuid>,
    pub suggestion_type: SuggestionType,
    pub suggested_value: String,
    pub confidence_score: f64,
    pub category_id: Option<Uuid>,
    pub user_feedback: Option<UserFeedback>,
    pub is_accepted: bool,
    /// True once the learning nudge for this suggestion has been applied.
    pub feedback_processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The merged result of analyzing all images of one listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedSuggestion {
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub price: Option<f64>,
    pub condition: Option<ItemCondition>,
    pub overall_confidence: f64,
    /// Accumulated per-name confidence sums, kept for diagnostics.
    pub object_scores: Vec<(String, f64)>,
    pub label_scores: Vec<(String, f64)>,
    /// How many per-image results contributed.
    pub image_count: usize,
}

/// Request payload for recording feedback on a suggestion.
#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[garde(skip)]
    pub feedback: UserFeedback,

    #[garde(length(min = 1, max = 2000))]
    pub modified_value: Option<String>,
}

/// Request payload for enqueueing images for background analysis.
#[derive(Debug, Deserialize, Validate)]
pub struct EnqueueRequest {
    #[garde(length(min = 1, max = 100))]
    pub image_ids: Vec<Uuid>,

    #[garde(skip)]
    pub article_id: Option<Uuid>,

    #[garde(skip)]
    pub processing_type: crate::models::queue::ProcessingType,

    #[garde(range(min = 0, max = 100))]
    #[serde(default)]
    pub priority: i32,
}

/// Response after enqueueing images.
#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub count_added: usize,
}
