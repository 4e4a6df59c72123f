use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::suggestion::{Suggestion, SuggestionType, UserFeedback};

const SUGGESTION_COLUMNS: &str = "id, article_id, image_id, suggestion_type, suggested_value, \
     confidence_score, category_id, user_feedback, is_accepted, feedback_processed, \
     created_at, updated_at";

fn map_suggestion(row: &PgRow) -> Result<Suggestion, sqlx::Error> {
    let type_str: String = row.try_get("suggestion_type")?;
    let feedback_str: Option<String> = row.try_get("user_feedback")?;

    Ok(Suggestion {
        id: row.try_get("id")?,
        article_id: row.try_get("article_id")?,
        image_id: row.try_get("image_id")?,
        suggestion_type: type_str.parse().unwrap_or(SuggestionType::Title),
        suggested_value: row.try_get("suggested_value")?,
        confidence_score: row.try_get("confidence_score")?,
        category_id: row.try_get("category_id")?,
        user_feedback: feedback_str.and_then(|s| s.parse().ok()),
        is_accepted: row.try_get("is_accepted")?,
        feedback_processed: row.try_get("feedback_processed")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert one suggestion row.
pub async fn insert_suggestion(
    pool: &PgPool,
    article_id: Uuid,
    image_id: Option<Uuid>,
    suggestion_type: SuggestionType,
    suggested_value: &str,
    confidence_score: f64,
    category_id: Option<Uuid>,
) -> Result<Suggestion, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO suggestions
            (article_id, image_id, suggestion_type, suggested_value, confidence_score, category_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {SUGGESTION_COLUMNS}
        "#
    ))
    .bind(article_id)
    .bind(image_id)
    .bind(suggestion_type.to_string())
    .bind(suggested_value)
    .bind(confidence_score)
    .bind(category_id)
    .fetch_one(pool)
    .await?;

    map_suggestion(&row)
}

/// Get a suggestion by ID.
pub async fn get_suggestion(
    pool: &PgPool,
    suggestion_id: Uuid,
) -> Result<Option<Suggestion>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE id = $1"
    ))
    .bind(suggestion_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_suggestion).transpose()
}

/// Suggestions for an article, newest first.
pub async fn suggestions_for_article(
    pool: &PgPool,
    article_id: Uuid,
) -> Result<Vec<Suggestion>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE article_id = $1 ORDER BY created_at DESC"
    ))
    .bind(article_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_suggestion).collect()
}

/// Persist user feedback on a suggestion. Returns the updated suggestion and
/// whether this was the first feedback processed for it — the learning nudge
/// must run only when that flag is true. The stored feedback value is
/// updated either way.
pub async fn record_feedback(
    pool: &PgPool,
    suggestion_id: Uuid,
    feedback: UserFeedback,
    modified_value: Option<&str>,
) -> Result<Option<(Suggestion, bool)>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT feedback_processed FROM suggestions WHERE id = $1 FOR UPDATE")
        .bind(suggestion_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let already_processed: bool = row.try_get("feedback_processed")?;

    let is_accepted = feedback == UserFeedback::Accepted;
    let row = sqlx::query(&format!(
        r#"
        UPDATE suggestions
        SET user_feedback = $2,
            is_accepted = $3,
            suggested_value = COALESCE($4, suggested_value),
            feedback_processed = TRUE,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {SUGGESTION_COLUMNS}
        "#
    ))
    .bind(suggestion_id)
    .bind(feedback.to_string())
    .bind(is_accepted)
    .bind(modified_value)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Some((map_suggestion(&row)?, !already_processed)))
}

/// Rolling 3-month feedback average for one suggestion type, mapped as
/// accepted → 1.2, rejected → 0.8, modified → 1.0. None when the window has
/// no feedback.
pub async fn feedback_weight_seed(
    pool: &PgPool,
    suggestion_type: SuggestionType,
) -> Result<Option<f64>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT AVG(CASE user_feedback
                   WHEN 'accepted' THEN 1.2
                   WHEN 'rejected' THEN 0.8
                   WHEN 'modified' THEN 1.0
                   END) AS seed
        FROM suggestions
        WHERE suggestion_type = $1
          AND user_feedback IS NOT NULL
          AND updated_at > NOW() - INTERVAL '3 months'
        "#,
    )
    .bind(suggestion_type.to_string())
    .fetch_one(pool)
    .await?;

    row.try_get("seed")
}

/// Fraction of suggestions of a type accepted over the trailing 6 months,
/// optionally restricted to one category. None when there is no history.
pub async fn historical_acceptance(
    pool: &PgPool,
    suggestion_type: SuggestionType,
    category_id: Option<Uuid>,
) -> Result<Option<f64>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT AVG(CASE WHEN user_feedback = 'accepted' THEN 1.0 ELSE 0.0 END) AS fraction
        FROM suggestions
        WHERE suggestion_type = $1
          AND user_feedback IS NOT NULL
          AND ($2::UUID IS NULL OR category_id = $2)
          AND updated_at > NOW() - INTERVAL '6 months'
        "#,
    )
    .bind(suggestion_type.to_string())
    .bind(category_id)
    .fetch_one(pool)
    .await?;

    row.try_get("fraction")
}

/// Load persisted confidence weights.
pub async fn load_weights(pool: &PgPool) -> Result<HashMap<SuggestionType, f64>, sqlx::Error> {
    let rows = sqlx::query("SELECT suggestion_type, weight FROM confidence_weights")
        .fetch_all(pool)
        .await?;

    let mut weights = HashMap::new();
    for row in rows {
        let type_str: String = row.try_get("suggestion_type")?;
        if let Ok(suggestion_type) = type_str.parse::<SuggestionType>() {
            weights.insert(suggestion_type, row.try_get("weight")?);
        }
    }

    Ok(weights)
}

/// Upsert one confidence weight.
pub async fn save_weight(
    pool: &PgPool,
    suggestion_type: SuggestionType,
    weight: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO confidence_weights (suggestion_type, weight, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (suggestion_type)
        DO UPDATE SET weight = EXCLUDED.weight, updated_at = NOW()
        "#,
    )
    .bind(suggestion_type.to_string())
    .bind(weight)
    .execute(pool)
    .await?;

    Ok(())
}
