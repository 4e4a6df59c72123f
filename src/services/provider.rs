use sqlx::PgPool;
use strsim::jaro_winkler;
use uuid::Uuid;

use crate::db::{catalog_queries, suggestion_queries};
use crate::models::analysis::{AnalysisResult, AnalysisSource};
use crate::models::catalog::{CategoryCatalog, ItemCondition, PriceStats};
use crate::models::suggestion::SuggestionType;
use crate::services::confidence::{ConfidenceCalculator, ScoreContext};
use crate::services::fallback::{self, FallbackError};
use crate::services::vision::VisionClient;

/// Minimum fuzzy similarity for a detection name to count as a keyword hit.
const KEYWORD_MATCH_THRESHOLD: f64 = 0.88;

/// Object hits weigh twice as much as label hits in category scoring.
const OBJECT_KEYWORD_WEIGHT: f64 = 2.0;
const LABEL_KEYWORD_WEIGHT: f64 = 1.0;

/// No confidence score of a fallback-sourced analysis may exceed this.
const FALLBACK_CONFIDENCE_CEILING: f64 = 0.6;

/// Recognized text longer than this is left out of descriptions.
const MAX_DESCRIPTION_TEXT_LEN: usize = 40;

/// Per-image analysis options supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Original filename, used by the fallback's pattern labels.
    pub filename: Option<String>,
}

/// Wraps the remote vision provider with local-fallback degradation.
/// Remote failure is never surfaced as a hard error; only unreadable image
/// bytes are fatal for an image.
pub struct AnalysisProvider {
    vision: Option<VisionClient>,
}

impl AnalysisProvider {
    pub fn new(vision: Option<VisionClient>) -> Self {
        Self { vision }
    }

    pub fn remote_enabled(&self) -> bool {
        self.vision.is_some()
    }

    /// Produce raw detections for one image: remote provider when enabled,
    /// local fallback otherwise or on any remote failure.
    pub async fn analyze(
        &self,
        image_bytes: &[u8],
        opts: &AnalysisOptions,
    ) -> Result<AnalysisResult, AnalysisError> {
        if let Some(vision) = &self.vision {
            match vision.annotate(image_bytes).await {
                Ok(result) => {
                    metrics::counter!("autofill_analysis_remote_total").increment(1);
                    return Ok(result);
                }
                Err(e) => {
                    // Degrade, never abort; retries belong to the queue.
                    tracing::warn!(error = %e, "vision provider failed, using local fallback");
                }
            }
        }

        let result = fallback::analyze_fallback(image_bytes, opts.filename.as_deref())?;
        metrics::counter!("autofill_analysis_fallback_total").increment(1);
        Ok(result)
    }
}

// ── Suggestion derivation ────────────────────────────────────────────────

fn keyword_hit(name: &str, keywords: &[String]) -> bool {
    let name = name.to_lowercase();
    keywords.iter().any(|kw| {
        let kw = kw.to_lowercase();
        name == kw
            || name.contains(&kw)
            || kw.contains(&name)
            || jaro_winkler(&name, &kw) >= KEYWORD_MATCH_THRESHOLD
    })
}

/// Keyword match between detections and each category's keyword list;
/// object hits weigh 2× label hits. Returns the winning category and its
/// normalized match strength, or None when nothing matches.
pub fn derive_category(
    result: &AnalysisResult,
    catalog: &CategoryCatalog,
) -> Option<(Uuid, f64)> {
    let max_score = OBJECT_KEYWORD_WEIGHT * result.objects.len() as f64
        + LABEL_KEYWORD_WEIGHT * result.labels.len() as f64;
    if max_score == 0.0 || catalog.is_empty() {
        return None;
    }

    let mut best: Option<(Uuid, f64)> = None;
    for category in &catalog.categories {
        let mut score = 0.0;
        for object in &result.objects {
            if keyword_hit(&object.name, &category.keywords) {
                score += OBJECT_KEYWORD_WEIGHT;
            }
        }
        for label in &result.labels {
            if keyword_hit(&label.name, &category.keywords) {
                score += LABEL_KEYWORD_WEIGHT;
            }
        }

        if score > 0.0 && best.map(|(_, s)| score / max_score > s).unwrap_or(true) {
            best = Some((category.id, score / max_score));
        }
    }

    best
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Top 3 objects by confidence, capitalized and space-joined; falls back to
/// the top 2 labels when no objects were detected.
pub fn derive_title(result: &AnalysisResult) -> Option<String> {
    let names: Vec<String> = if !result.objects.is_empty() {
        let mut objects: Vec<_> = result.objects.iter().collect();
        objects.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        objects.iter().take(3).map(|o| capitalize(&o.name)).collect()
    } else {
        let mut labels: Vec<_> = result.labels.iter().collect();
        labels.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        labels.iter().take(2).map(|l| capitalize(&l.name)).collect()
    };

    if names.is_empty() {
        None
    } else {
        Some(names.join(" "))
    }
}

/// Templated sentence over the top detections, the dominant color name and
/// any short recognized text span.
pub fn derive_description(result: &AnalysisResult) -> Option<String> {
    let mut items: Vec<String> = Vec::new();
    for name in result
        .objects
        .iter()
        .map(|o| o.name.to_lowercase())
        .chain(result.labels.iter().map(|l| l.name.to_lowercase()))
    {
        if !items.contains(&name) {
            items.push(name);
        }
        if items.len() == 5 {
            break;
        }
    }

    if items.is_empty() {
        return None;
    }

    let mut description = format!("This item appears to include: {}.", items.join(", "));

    if let Some(color) = result.dominant_colors.first() {
        description.push_str(&format!(
            " The dominant color is {}.",
            fallback::color_name(color)
        ));
    }

    if let Some(text) = result
        .text_fragments
        .iter()
        .find(|t| !t.text.trim().is_empty() && t.text.trim().len() <= MAX_DESCRIPTION_TEXT_LEN)
    {
        description.push_str(&format!(" Visible text: \"{}\".", text.text.trim()));
    }

    Some(description)
}

/// Condition heuristic from mean object-detection confidence.
pub fn derive_condition(result: &AnalysisResult) -> ItemCondition {
    if result.objects.is_empty() {
        return ItemCondition::default();
    }

    let mean = result.objects.iter().map(|o| o.confidence).sum::<f64>()
        / result.objects.len() as f64;

    if mean > 0.8 {
        ItemCondition::LikeNew
    } else if mean < 0.4 {
        ItemCondition::Fair
    } else {
        ItemCondition::Good
    }
}

/// Category trailing-average sale price scaled by the condition multiplier,
/// with a ±20% range.
pub fn derive_price(stats: &PriceStats, condition: ItemCondition) -> (f64, (f64, f64)) {
    let price = stats.avg * condition.price_multiplier();
    (price, (price * 0.8, price * 1.2))
}

/// Fill in the derived suggestion fields and their confidence scores on a
/// freshly analyzed result. Category and price need catalog and feedback
/// history, hence the pool.
pub async fn derive_suggestions(
    pool: &PgPool,
    calculator: &ConfidenceCalculator,
    catalog: &CategoryCatalog,
    result: &mut AnalysisResult,
) -> Result<(), sqlx::Error> {
    // Category first: price and its confidence depend on it.
    let category = derive_category(result, catalog);
    if let Some((category_id, strength)) = category {
        result.suggested_category = Some(category_id);

        let historical =
            suggestion_queries::historical_acceptance(pool, SuggestionType::Category, Some(category_id))
                .await?;
        let ctx = ScoreContext {
            keyword_strength: Some(strength),
            historical_acceptance: historical,
            ..Default::default()
        };
        let score = calculator.score(result, SuggestionType::Category, &ctx);
        result.confidence_scores.insert("category".to_string(), score);
    }

    let condition = derive_condition(result);
    result.suggested_condition = Some(condition);
    let score = calculator.score(result, SuggestionType::Condition, &ScoreContext::default());
    result.confidence_scores.insert("condition".to_string(), score);

    if let Some((category_id, _)) = category {
        if let Some(stats) = catalog_queries::price_stats(pool, category_id, condition).await? {
            let (price, range) = derive_price(&stats, condition);
            result.suggested_price = Some(price);
            result.price_range = Some(range);

            let historical =
                suggestion_queries::historical_acceptance(pool, SuggestionType::Price, Some(category_id))
                    .await?;
            let ctx = ScoreContext {
                price_sample_size: Some(stats.sample_size),
                historical_acceptance: historical,
                category_confidence: result.confidence_scores.get("category").copied(),
                ..Default::default()
            };
            let score = calculator.score(result, SuggestionType::Price, &ctx);
            result.confidence_scores.insert("price".to_string(), score);
        }
    }

    if let Some(title) = derive_title(result) {
        result.suggested_title = Some(title);
        let score = calculator.score(result, SuggestionType::Title, &ScoreContext::default());
        result.confidence_scores.insert("title".to_string(), score);
    }

    if let Some(description) = derive_description(result) {
        result.suggested_description = Some(description);
        let score =
            calculator.score(result, SuggestionType::Description, &ScoreContext::default());
        result.confidence_scores.insert("description".to_string(), score);
    }

    // Fallback analyses carry weaker signal than any remote detection; their
    // suggestion confidences are capped accordingly.
    if result.source == AnalysisSource::Fallback {
        for score in result.confidence_scores.values_mut() {
            *score = score.min(FALLBACK_CONFIDENCE_CEILING);
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    InvalidImage(#[from] FallbackError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::{DetectedObject, DominantColor, ImageLabel, TextFragment};
    use crate::models::catalog::Category;

    fn object(name: &str, confidence: f64) -> DetectedObject {
        DetectedObject {
            name: name.to_string(),
            confidence,
            bounds: None,
        }
    }

    fn label(name: &str, confidence: f64) -> ImageLabel {
        ImageLabel {
            name: name.to_string(),
            confidence,
        }
    }

    fn catalog() -> CategoryCatalog {
        CategoryCatalog::new(vec![
            Category {
                id: Uuid::new_v4(),
                name: "Electronics".to_string(),
                keywords: vec!["phone".into(), "laptop".into(), "camera".into()],
            },
            Category {
                id: Uuid::new_v4(),
                name: "Furniture".to_string(),
                keywords: vec!["sofa".into(), "chair".into(), "table".into()],
            },
        ])
    }

    #[test]
    fn test_category_objects_outweigh_labels() {
        let catalog = catalog();
        let electronics = catalog.categories[0].id;
        let furniture = catalog.categories[1].id;

        // One object hit for electronics (weight 2) vs one label hit for
        // furniture (weight 1).
        let mut result = AnalysisResult::empty(AnalysisSource::Remote);
        result.objects = vec![object("phone", 0.9)];
        result.labels = vec![label("sofa", 0.9)];

        let (winner, strength) = derive_category(&result, &catalog).expect("category");
        assert_eq!(winner, electronics);
        assert_ne!(winner, furniture);
        // 2 of a possible 3 weighted points.
        assert!((strength - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_category_none_without_matches() {
        let mut result = AnalysisResult::empty(AnalysisSource::Remote);
        result.objects = vec![object("zebra", 0.9)];
        assert!(derive_category(&result, &catalog()).is_none());
    }

    #[test]
    fn test_title_top_three_objects() {
        let mut result = AnalysisResult::empty(AnalysisSource::Remote);
        result.objects = vec![
            object("case", 0.5),
            object("phone", 0.95),
            object("charger", 0.7),
            object("cable", 0.6),
        ];

        assert_eq!(derive_title(&result).as_deref(), Some("Phone Charger Cable"));
    }

    #[test]
    fn test_title_falls_back_to_labels() {
        let mut result = AnalysisResult::empty(AnalysisSource::Fallback);
        result.labels = vec![label("electronics", 0.6), label("gadget", 0.5), label("metal", 0.4)];

        assert_eq!(derive_title(&result).as_deref(), Some("Electronics Gadget"));
    }

    #[test]
    fn test_title_none_when_nothing_detected() {
        let result = AnalysisResult::empty(AnalysisSource::Fallback);
        assert!(derive_title(&result).is_none());
    }

    #[test]
    fn test_condition_thresholds() {
        let mut result = AnalysisResult::empty(AnalysisSource::Remote);

        result.objects = vec![object("phone", 0.9), object("case", 0.85)];
        assert_eq!(derive_condition(&result), ItemCondition::LikeNew);

        result.objects = vec![object("phone", 0.3), object("case", 0.2)];
        assert_eq!(derive_condition(&result), ItemCondition::Fair);

        result.objects = vec![object("phone", 0.6)];
        assert_eq!(derive_condition(&result), ItemCondition::Good);

        result.objects.clear();
        assert_eq!(derive_condition(&result), ItemCondition::Good);
    }

    #[test]
    fn test_price_scaled_by_condition_with_range() {
        let stats = PriceStats {
            avg: 100.0,
            min: 40.0,
            max: 180.0,
            sample_size: 12,
        };

        let (price, (low, high)) = derive_price(&stats, ItemCondition::Good);
        assert!((price - 70.0).abs() < 1e-9);
        assert!((low - 56.0).abs() < 1e-9);
        assert!((high - 84.0).abs() < 1e-9);
    }

    #[test]
    fn test_description_mentions_detections_color_and_text() {
        let mut result = AnalysisResult::empty(AnalysisSource::Remote);
        result.objects = vec![object("Phone", 0.9)];
        result.labels = vec![label("electronics", 0.8)];
        result.dominant_colors = vec![DominantColor {
            red: 10,
            green: 10,
            blue: 10,
            score: 0.8,
            pixel_fraction: 0.8,
        }];
        result.text_fragments = vec![TextFragment {
            text: "128 GB".to_string(),
            confidence: 0.9,
            bounds: None,
        }];

        let description = derive_description(&result).expect("description");
        assert!(description.contains("phone"));
        assert!(description.contains("black"));
        assert!(description.contains("128 GB"));
    }
}
