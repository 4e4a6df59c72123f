use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a queue item in the background pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

/// Kind of background work attached to an image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcessingType {
    Analysis,
    Similarity,
    Categorization,
    TextExtraction,
}

/// One unit of background work: one image, one processing type.
/// Mutated only by the queue worker and the periodic sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub image_id: Uuid,
    pub article_id: Option<Uuid>,
    pub processing_type: ProcessingType,
    pub status: QueueStatus,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// A failed item is retry-eligible while it has attempts left and is
    /// younger than the 24h recency window.
    pub fn retry_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Failed
            && self.attempts < self.max_attempts
            && now.signed_duration_since(self.created_at) <= chrono::Duration::hours(24)
    }
}

/// Per-status counts exposed via the stats endpoint and the health gauge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    /// Age of the oldest pending item, in seconds.
    pub oldest_pending_secs: Option<i64>,
}
