use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::catalog::{Category, CategoryCatalog, ItemCondition, PriceStats};

/// Load the full category catalog with keyword lists.
pub async fn load_catalog(pool: &PgPool) -> Result<CategoryCatalog, sqlx::Error> {
    let rows = sqlx::query("SELECT id, name, keywords FROM categories ORDER BY name")
        .fetch_all(pool)
        .await?;

    let categories = rows
        .into_iter()
        .map(|row| {
            Ok(Category {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                keywords: row.try_get("keywords")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(CategoryCatalog::new(categories))
}

/// Trailing-6-month sale price statistics for a (category, condition) pair.
/// None when there are no recorded sales in the window.
pub async fn price_stats(
    pool: &PgPool,
    category_id: Uuid,
    condition: ItemCondition,
) -> Result<Option<PriceStats>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT AVG(sale_price) AS avg,
               MIN(sale_price) AS min,
               MAX(sale_price) AS max,
               COUNT(*) AS sample_size
        FROM price_history
        WHERE category_id = $1
          AND condition = $2
          AND sold_at > NOW() - INTERVAL '6 months'
        "#,
    )
    .bind(category_id)
    .bind(condition.to_string())
    .fetch_one(pool)
    .await?;

    let sample_size: i64 = row.try_get("sample_size")?;
    if sample_size == 0 {
        return Ok(None);
    }

    Ok(Some(PriceStats {
        avg: row.try_get("avg")?,
        min: row.try_get("min")?,
        max: row.try_get("max")?,
        sample_size,
    }))
}
