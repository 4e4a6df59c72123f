use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::queue::{ProcessingType, QueueItem, QueueStats, QueueStatus};

const QUEUE_COLUMNS: &str = "id, image_id, article_id, processing_type, status, priority, \
     attempts, max_attempts, error_message, created_at, started_at, completed_at";

fn map_queue_item(row: &PgRow) -> Result<QueueItem, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let type_str: String = row.try_get("processing_type")?;

    Ok(QueueItem {
        id: row.try_get("id")?,
        image_id: row.try_get("image_id")?,
        article_id: row.try_get("article_id")?,
        processing_type: type_str.parse().unwrap_or(ProcessingType::Analysis),
        status: status_str.parse().unwrap_or(QueueStatus::Pending),
        priority: row.try_get("priority")?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Enqueue images for background processing. An image that already has a
/// pending or processing item of the same type is skipped, so repeated
/// submissions do not pile up duplicate work.
pub async fn enqueue_items(
    pool: &PgPool,
    image_ids: &[Uuid],
    article_id: Option<Uuid>,
    processing_type: ProcessingType,
    priority: i32,
    max_attempts: i32,
) -> Result<usize, sqlx::Error> {
    let mut added = 0;

    for image_id in image_ids {
        let result = sqlx::query(
            r#"
            INSERT INTO processing_queue (image_id, article_id, processing_type, priority, max_attempts)
            SELECT $1, $2, $3, $4, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM processing_queue
                WHERE image_id = $1
                  AND processing_type = $3
                  AND status IN ('pending', 'processing')
            )
            "#,
        )
        .bind(image_id)
        .bind(article_id)
        .bind(processing_type.to_string())
        .bind(priority)
        .bind(max_attempts)
        .execute(pool)
        .await?;

        added += result.rows_affected() as usize;
    }

    Ok(added)
}

/// Atomically claim a batch of pending items, oldest first. The claim marks
/// each item `processing` and increments its attempt counter in the same
/// statement; `FOR UPDATE SKIP LOCKED` keeps concurrent workers from
/// claiming the same row.
pub async fn claim_pending_batch(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<QueueItem>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        UPDATE processing_queue
        SET status = 'processing',
            attempts = attempts + 1,
            started_at = NOW()
        WHERE id IN (
            SELECT id FROM processing_queue
            WHERE status = 'pending' AND attempts < max_attempts
            ORDER BY priority DESC, created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {QUEUE_COLUMNS}
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_queue_item).collect()
}

/// Mark an item completed, storing its analysis result alongside.
pub async fn mark_completed(
    pool: &PgPool,
    item_id: Uuid,
    analysis_result: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE processing_queue
        SET status = 'completed',
            analysis_result = $2,
            error_message = NULL,
            completed_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(item_id)
    .bind(analysis_result)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark an item failed with its error message.
pub async fn mark_failed(pool: &PgPool, item_id: Uuid, error: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE processing_queue
        SET status = 'failed',
            error_message = $2,
            completed_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(item_id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Retry sweep: failed items with attempts left, created within the last
/// 24 hours, go back to pending.
pub async fn sweep_retries(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE processing_queue
        SET status = 'pending',
            started_at = NULL,
            completed_at = NULL
        WHERE status = 'failed'
          AND attempts < max_attempts
          AND created_at > NOW() - INTERVAL '24 hours'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Stale sweep: a `processing` item whose worker never reported back (e.g.
/// a crash mid-item) is reclaimed as failed once it has been in flight
/// longer than `stale_after_minutes`, making it visible to the retry sweep.
pub async fn sweep_stale(pool: &PgPool, stale_after_minutes: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE processing_queue
        SET status = 'failed',
            error_message = 'processing timed out; reclaimed by stale sweep',
            completed_at = NOW()
        WHERE status = 'processing'
          AND started_at < NOW() - make_interval(mins => $1)
        "#,
    )
    .bind(stale_after_minutes as i32)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Cleanup sweep: purge terminal items older than the retention window.
pub async fn sweep_cleanup(pool: &PgPool, retention_days: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM processing_queue
        WHERE status IN ('completed', 'failed')
          AND completed_at < NOW() - make_interval(days => $1)
        "#,
    )
    .bind(retention_days as i32)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Per-status counts plus the age of the oldest pending item.
pub async fn stats(pool: &PgPool) -> Result<QueueStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'pending') AS pending,
            COUNT(*) FILTER (WHERE status = 'processing') AS processing,
            COUNT(*) FILTER (WHERE status = 'completed') AS completed,
            COUNT(*) FILTER (WHERE status = 'failed') AS failed,
            EXTRACT(EPOCH FROM NOW() - MIN(created_at) FILTER (WHERE status = 'pending'))::BIGINT
                AS oldest_pending_secs
        FROM processing_queue
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(QueueStats {
        pending: row.try_get("pending")?,
        processing: row.try_get("processing")?,
        completed: row.try_get("completed")?,
        failed: row.try_get("failed")?,
        oldest_pending_secs: row.try_get("oldest_pending_secs")?,
    })
}

/// True while the article still has queue items that have not reached a
/// terminal state. Gates the background aggregation trigger.
pub async fn article_has_open_items(pool: &PgPool, article_id: Uuid) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM processing_queue
            WHERE article_id = $1 AND status IN ('pending', 'processing')
        ) AS open
        "#,
    )
    .bind(article_id)
    .fetch_one(pool)
    .await?;

    row.try_get("open")
}

/// Stored analysis results of all completed items for an article, in
/// first-seen (creation) order. The ordering makes aggregation tie-breaks
/// reproducible.
pub async fn completed_results_for_article(
    pool: &PgPool,
    article_id: Uuid,
) -> Result<Vec<(Uuid, serde_json::Value)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT image_id, analysis_result
        FROM processing_queue
        WHERE article_id = $1
          AND status = 'completed'
          AND analysis_result IS NOT NULL
        ORDER BY created_at ASC
        "#,
    )
    .bind(article_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| Ok((r.try_get("image_id")?, r.try_get("analysis_result")?)))
        .collect()
}

/// Get a queue item by ID.
pub async fn get_item(pool: &PgPool, item_id: Uuid) -> Result<Option<QueueItem>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {QUEUE_COLUMNS} FROM processing_queue WHERE id = $1"
    ))
    .bind(item_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_queue_item).transpose()
}
