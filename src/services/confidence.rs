use sqlx::PgPool;
use std::collections::HashMap;

use crate::db::suggestion_queries;
use crate::models::analysis::AnalysisResult;
use crate::models::suggestion::{SuggestionType, UserFeedback};

/// Confidence output clamp.
pub const MIN_CONFIDENCE: f64 = 0.1;
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Learned feedback weight clamp.
pub const MIN_WEIGHT: f64 = 0.3;
pub const MAX_WEIGHT: f64 = 1.5;

const DEFAULT_WEIGHT: f64 = 1.0;

/// Used for category/price when there is no feedback history yet.
const DEFAULT_HISTORICAL_ACCEPTANCE: f64 = 0.5;

/// Inputs to scoring that come from outside the analysis result itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreContext {
    /// Trailing 6-month acceptance fraction for this suggestion type
    /// (optionally category-filtered).
    pub historical_acceptance: Option<f64>,
    /// Normalized keyword match score of the winning category.
    pub keyword_strength: Option<f64>,
    /// Sample size behind the price statistics used.
    pub price_sample_size: Option<i64>,
    /// Confidence already computed for the category suggestion.
    pub category_confidence: Option<f64>,
}

/// Scores suggested fields and carries the per-type learned feedback
/// weights. Explicitly injected state; mutated only through
/// `apply_feedback`.
#[derive(Debug, Clone)]
pub struct ConfidenceCalculator {
    weights: HashMap<SuggestionType, f64>,
}

impl Default for ConfidenceCalculator {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl ConfidenceCalculator {
    pub fn new(weights: HashMap<SuggestionType, f64>) -> Self {
        Self { weights }
    }

    /// Build the calculator from persisted weights, seeding any missing
    /// type from the rolling 3-month feedback aggregate and persisting the
    /// seed so it survives restarts.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let mut weights = suggestion_queries::load_weights(pool).await?;

        for suggestion_type in SuggestionType::ALL {
            if weights.contains_key(&suggestion_type) {
                continue;
            }
            let seed = suggestion_queries::feedback_weight_seed(pool, suggestion_type)
                .await?
                .unwrap_or(DEFAULT_WEIGHT)
                .clamp(MIN_WEIGHT, MAX_WEIGHT);
            suggestion_queries::save_weight(pool, suggestion_type, seed).await?;
            weights.insert(suggestion_type, seed);
        }

        Ok(Self { weights })
    }

    pub fn weight(&self, suggestion_type: SuggestionType) -> f64 {
        self.weights
            .get(&suggestion_type)
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }

    /// Score one suggested field: weighted factor sum, multiplied by the
    /// type's learned weight, clamped to [0.1, 0.95].
    pub fn score(
        &self,
        result: &AnalysisResult,
        suggestion_type: SuggestionType,
        ctx: &ScoreContext,
    ) -> f64 {
        let base = match suggestion_type {
            SuggestionType::Title => title_base(result),
            SuggestionType::Description => description_base(result),
            SuggestionType::Category => category_base(result, ctx),
            SuggestionType::Price => price_base(ctx),
            SuggestionType::Condition => condition_base(result),
        };

        (base * self.weight(suggestion_type)).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
    }

    /// Online learning nudge: +0.05 on accept, −0.05 on reject, −0.02 on
    /// modify, clamped to [0.3, 1.5]. Returns the new weight. The caller is
    /// responsible for applying this at most once per suggestion (the
    /// `feedback_processed` flag) and for persisting the result.
    pub fn apply_feedback(
        &mut self,
        suggestion_type: SuggestionType,
        feedback: UserFeedback,
    ) -> f64 {
        let delta = match feedback {
            UserFeedback::Accepted => 0.05,
            UserFeedback::Rejected => -0.05,
            UserFeedback::Modified => -0.02,
        };

        let updated = (self.weight(suggestion_type) + delta).clamp(MIN_WEIGHT, MAX_WEIGHT);
        self.weights.insert(suggestion_type, updated);
        updated
    }
}

// ── Per-type factor tables ───────────────────────────────────────────────
// Each type has 2–4 named factors with weights summing to 1.0.

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// title: object-clarity 0.5, object-count 0.3, detection-consistency 0.2
fn title_base(result: &AnalysisResult) -> f64 {
    let top3_mean = mean(result.objects.iter().take(3).map(|o| o.confidence));
    let clarity = (1.2 * top3_mean).min(1.0);

    let count = (result.objects.len() as f64 / 10.0).min(1.0);

    let consistency = if result.objects.is_empty() {
        0.0
    } else {
        let unique: std::collections::HashSet<String> = result
            .objects
            .iter()
            .map(|o| o.name.to_lowercase())
            .collect();
        1.0 - unique.len() as f64 / result.objects.len() as f64
    };

    clarity * 0.5 + count * 0.3 + consistency * 0.2
}

/// description: signal-richness 0.4, text-presence 0.3, color-signal 0.3
fn description_base(result: &AnalysisResult) -> f64 {
    let richness =
        ((result.objects.len() + result.labels.len()) as f64 / 12.0).min(1.0);

    let text = if result.text_fragments.is_empty() { 0.2 } else { 1.0 };

    let color = result
        .dominant_colors
        .first()
        .map(|c| c.score.min(1.0))
        .unwrap_or(0.0);

    richness * 0.4 + text * 0.3 + color * 0.3
}

/// category: keyword-strength 0.5, historical-accuracy 0.3, label-support 0.2
fn category_base(result: &AnalysisResult, ctx: &ScoreContext) -> f64 {
    let keyword = ctx.keyword_strength.unwrap_or(0.0).clamp(0.0, 1.0);
    let historical = ctx
        .historical_acceptance
        .unwrap_or(DEFAULT_HISTORICAL_ACCEPTANCE);
    let support = (result.labels.len() as f64 / 8.0).min(1.0);

    keyword * 0.5 + historical * 0.3 + support * 0.2
}

/// price: sample-depth 0.4, historical-accuracy 0.35, category-certainty 0.25
fn price_base(ctx: &ScoreContext) -> f64 {
    let depth = (ctx.price_sample_size.unwrap_or(0) as f64 / 20.0).min(1.0);
    let historical = ctx
        .historical_acceptance
        .unwrap_or(DEFAULT_HISTORICAL_ACCEPTANCE);
    let certainty = ctx
        .category_confidence
        .unwrap_or(DEFAULT_HISTORICAL_ACCEPTANCE);

    depth * 0.4 + historical * 0.35 + certainty * 0.25
}

/// condition: detection-strength 0.6, object-count 0.4
fn condition_base(result: &AnalysisResult) -> f64 {
    let strength = mean(result.objects.iter().map(|o| o.confidence));
    let count = (result.objects.len() as f64 / 6.0).min(1.0);

    strength * 0.6 + count * 0.4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::{AnalysisSource, DetectedObject, ImageLabel};

    fn result_with_objects(confidences: &[f64]) -> AnalysisResult {
        let mut result = AnalysisResult::empty(AnalysisSource::Remote);
        result.objects = confidences
            .iter()
            .enumerate()
            .map(|(i, &c)| DetectedObject {
                name: format!("object{i}"),
                confidence: c,
                bounds: None,
            })
            .collect();
        result
    }

    #[test]
    fn test_scores_clamped_to_floor_for_empty_result() {
        let calc = ConfidenceCalculator::default();
        let empty = AnalysisResult::empty(AnalysisSource::Fallback);
        let ctx = ScoreContext::default();

        for suggestion_type in SuggestionType::ALL {
            let score = calc.score(&empty, suggestion_type, &ctx);
            assert!(
                (MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&score),
                "{suggestion_type} out of range: {score}"
            );
        }

        // Title with no detections bottoms out at the floor.
        assert_eq!(calc.score(&empty, SuggestionType::Title, &ctx), MIN_CONFIDENCE);
    }

    #[test]
    fn test_scores_clamped_to_ceiling() {
        // Max out every factor and a max feedback weight.
        let mut weights = HashMap::new();
        weights.insert(SuggestionType::Title, MAX_WEIGHT);
        let calc = ConfidenceCalculator::new(weights);

        let mut result = result_with_objects(&[1.0; 10]);
        for o in result.objects.iter_mut() {
            o.name = "phone".to_string();
        }

        let score = calc.score(&result, SuggestionType::Title, &ScoreContext::default());
        assert_eq!(score, MAX_CONFIDENCE);
    }

    #[test]
    fn test_title_factors_reward_clear_repeated_detections() {
        let calc = ConfidenceCalculator::default();
        let strong = result_with_objects(&[0.9, 0.85, 0.8]);
        let weak = result_with_objects(&[0.3]);

        let strong_score = calc.score(&strong, SuggestionType::Title, &ScoreContext::default());
        let weak_score = calc.score(&weak, SuggestionType::Title, &ScoreContext::default());
        assert!(strong_score > weak_score);
    }

    #[test]
    fn test_category_uses_default_history_when_absent() {
        let calc = ConfidenceCalculator::default();
        let mut result = AnalysisResult::empty(AnalysisSource::Remote);
        result.labels = (0..4)
            .map(|i| ImageLabel {
                name: format!("label{i}"),
                confidence: 0.9,
            })
            .collect();

        let no_history = ScoreContext {
            keyword_strength: Some(1.0),
            ..Default::default()
        };
        let with_history = ScoreContext {
            keyword_strength: Some(1.0),
            historical_acceptance: Some(1.0),
            ..Default::default()
        };

        let base = calc.score(&result, SuggestionType::Category, &no_history);
        let boosted = calc.score(&result, SuggestionType::Category, &with_history);

        // Default history is 0.5; full history adds 0.3 * 0.5.
        assert!((boosted - base - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_feedback_nudges_and_clamps_weight() {
        let mut calc = ConfidenceCalculator::default();

        let up = calc.apply_feedback(SuggestionType::Price, UserFeedback::Accepted);
        assert!((up - 1.05).abs() < 1e-9);

        let down = calc.apply_feedback(SuggestionType::Price, UserFeedback::Modified);
        assert!((down - 1.03).abs() < 1e-9);

        for _ in 0..100 {
            calc.apply_feedback(SuggestionType::Price, UserFeedback::Rejected);
        }
        assert_eq!(calc.weight(SuggestionType::Price), MIN_WEIGHT);

        for _ in 0..100 {
            calc.apply_feedback(SuggestionType::Price, UserFeedback::Accepted);
        }
        assert_eq!(calc.weight(SuggestionType::Price), MAX_WEIGHT);
    }

    #[test]
    fn test_weight_scales_score() {
        let mut low = HashMap::new();
        low.insert(SuggestionType::Condition, MIN_WEIGHT);
        let low_calc = ConfidenceCalculator::new(low);
        let default_calc = ConfidenceCalculator::default();

        let result = result_with_objects(&[0.7, 0.7, 0.7]);
        let ctx = ScoreContext::default();

        assert!(
            low_calc.score(&result, SuggestionType::Condition, &ctx)
                < default_calc.score(&result, SuggestionType::Condition, &ctx)
        );
    }
}
