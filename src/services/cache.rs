use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::analysis::AnalysisResult;

const ANALYSIS_KEY_PREFIX: &str = "autofill:analysis:";
const CATEGORY_KEY_PREFIX: &str = "autofill:category:";

/// Full analyses are stable for a day; derived category lookups are cheaper
/// to recompute and more context-dependent, so they expire sooner.
const ANALYSIS_TTL_SECS: u64 = 24 * 60 * 60;
const CATEGORY_TTL_SECS: u64 = 60 * 60;

/// Deterministic digest of image bytes. Two uploads of the same photo map
/// to the same cache entry regardless of filename.
pub fn content_hash(image_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_bytes);
    format!("{:x}", hasher.finalize())
}

/// Redis-backed cache of prior analysis results, keyed by content hash.
pub struct AnalysisCache {
    client: redis::Client,
}

impl AnalysisCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(CacheError::Redis)?;
        Ok(Self { client })
    }

    /// Look up a cached analysis by content hash.
    pub async fn get_analysis(
        &self,
        content_hash: &str,
    ) -> Result<Option<AnalysisResult>, CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)?;

        let payload: Option<String> = conn
            .get(format!("{ANALYSIS_KEY_PREFIX}{content_hash}"))
            .await
            .map_err(CacheError::Redis)?;

        match payload {
            Some(json) => {
                let result = serde_json::from_str(&json).map_err(CacheError::Serialize)?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// Store an analysis under its content hash with the 24h TTL.
    pub async fn put_analysis(
        &self,
        content_hash: &str,
        result: &AnalysisResult,
    ) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)?;

        let payload = serde_json::to_string(result).map_err(CacheError::Serialize)?;
        conn.set_ex::<_, _, ()>(
            format!("{ANALYSIS_KEY_PREFIX}{content_hash}"),
            payload,
            ANALYSIS_TTL_SECS,
        )
        .await
        .map_err(CacheError::Redis)?;

        Ok(())
    }

    /// Look up a cached derived category suggestion.
    pub async fn get_category(&self, content_hash: &str) -> Result<Option<Uuid>, CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)?;

        let payload: Option<String> = conn
            .get(format!("{CATEGORY_KEY_PREFIX}{content_hash}"))
            .await
            .map_err(CacheError::Redis)?;

        Ok(payload.and_then(|s| s.parse().ok()))
    }

    /// Store a derived category suggestion with the 1h TTL.
    pub async fn put_category(
        &self,
        content_hash: &str,
        category_id: Uuid,
    ) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)?;

        conn.set_ex::<_, _, ()>(
            format!("{CATEGORY_KEY_PREFIX}{content_hash}"),
            category_id.to_string(),
            CATEGORY_TTL_SECS,
        )
        .await
        .map_err(CacheError::Redis)?;

        Ok(())
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)?;

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(CacheError::Redis)?;

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = content_hash(b"same bytes");
        let b = content_hash(b"same bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_differs_for_different_bytes() {
        assert_ne!(content_hash(b"photo one"), content_hash(b"photo two"));
    }
}
