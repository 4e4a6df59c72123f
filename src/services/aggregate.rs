use uuid::Uuid;

use crate::models::analysis::AnalysisResult;
use crate::models::catalog::ItemCondition;
use crate::models::suggestion::AggregatedSuggestion;

/// Title used when no image produced any object or label signal.
const TITLE_PLACEHOLDER: &str = "Untitled item";

/// Category confidence assumed for an image that suggested a category but
/// carries no score for it.
const DEFAULT_CATEGORY_CONFIDENCE: f64 = 0.5;

/// Price weight assumed for an image that suggested a price but carries no
/// score for it.
const DEFAULT_PRICE_WEIGHT: f64 = 0.3;

/// Raised when no per-image result carried usable signal.
#[derive(Debug, thiserror::Error)]
#[error("no images could be processed")]
pub struct AggregationEmpty;

/// Insertion-ordered score accumulator. Keeps first-seen order so that
/// equal-score ties resolve the same way on every run.
struct Accumulator {
    entries: Vec<(String, f64)>,
}

impl Accumulator {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn add(&mut self, key: &str, score: f64) {
        let key = key.to_lowercase();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, total)) => *total += score,
            None => self.entries.push((key, score)),
        }
    }

    /// Entries sorted by score descending; the sort is stable, so ties keep
    /// first-seen order.
    fn ranked(mut self) -> Vec<(String, f64)> {
        self.entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        self.entries
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Merge per-image analyses of one listing into a single proposed listing.
/// Pure and order-stable: permuting the inputs changes nothing unless two
/// candidates tie exactly, in which case the first-seen one wins.
pub fn aggregate(results: &[AnalysisResult]) -> Result<AggregatedSuggestion, AggregationEmpty> {
    if results.is_empty() {
        return Err(AggregationEmpty);
    }

    // Accumulate confidence per unique lowercase name across all images
    // (sum, not average).
    let mut objects = Accumulator::new();
    let mut labels = Accumulator::new();
    for result in results {
        for object in &result.objects {
            objects.add(&object.name, object.confidence);
        }
        for label in &result.labels {
            labels.add(&label.name, label.confidence);
        }
    }
    let object_scores = objects.ranked();
    let label_scores = labels.ranked();

    let title = if object_scores.is_empty() {
        TITLE_PLACEHOLDER.to_string()
    } else {
        object_scores
            .iter()
            .take(3)
            .map(|(name, _)| capitalize(name))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let description = build_description(&object_scores, &label_scores);

    // Category: accumulate each image's category confidence per candidate.
    let mut category_totals: Vec<(Uuid, f64)> = Vec::new();
    for result in results {
        if let Some(category_id) = result.suggested_category {
            let score = result
                .confidence_scores
                .get("category")
                .copied()
                .unwrap_or(DEFAULT_CATEGORY_CONFIDENCE);
            match category_totals.iter_mut().find(|(id, _)| *id == category_id) {
                Some((_, total)) => *total += score,
                None => category_totals.push((category_id, score)),
            }
        }
    }
    let category_id = category_totals
        .iter()
        .fold(None::<(Uuid, f64)>, |best, &(id, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((id, score)),
        })
        .map(|(id, _)| id);

    // Price: confidence-weighted average of all non-null suggested prices.
    let mut price_sum = 0.0;
    let mut weight_sum = 0.0;
    for result in results {
        if let Some(price) = result.suggested_price {
            let weight = result
                .confidence_scores
                .get("price")
                .copied()
                .unwrap_or(DEFAULT_PRICE_WEIGHT);
            price_sum += price * weight;
            weight_sum += weight;
        }
    }
    let price = (weight_sum > 0.0).then(|| price_sum / weight_sum);

    // Condition: majority vote, first-seen tie-break.
    let mut condition_votes: Vec<(ItemCondition, usize)> = Vec::new();
    for result in results {
        if let Some(condition) = result.suggested_condition {
            match condition_votes.iter_mut().find(|(c, _)| *c == condition) {
                Some((_, votes)) => *votes += 1,
                None => condition_votes.push((condition, 1)),
            }
        }
    }
    let condition = condition_votes
        .iter()
        .fold(None::<(ItemCondition, usize)>, |best, &(c, votes)| match best {
            Some((_, best_votes)) if best_votes >= votes => best,
            _ => Some((c, votes)),
        })
        .map(|(c, _)| c);

    // Mean over images of each image's own mean per-field confidence.
    let overall_confidence =
        results.iter().map(|r| r.mean_confidence()).sum::<f64>() / results.len() as f64;

    Ok(AggregatedSuggestion {
        title,
        description,
        category_id,
        price,
        condition,
        overall_confidence,
        object_scores,
        label_scores,
        image_count: results.len(),
    })
}

fn build_description(object_scores: &[(String, f64)], label_scores: &[(String, f64)]) -> String {
    let top_objects: Vec<&str> = object_scores.iter().take(3).map(|(n, _)| n.as_str()).collect();
    let top_labels: Vec<&str> = label_scores
        .iter()
        .filter(|(name, _)| !top_objects.contains(&name.as_str()))
        .take(5)
        .map(|(n, _)| n.as_str())
        .collect();

    match (top_objects.is_empty(), top_labels.is_empty()) {
        (true, true) => "No visual details could be determined from the photos.".to_string(),
        (false, true) => format!("Photos show: {}.", top_objects.join(", ")),
        (true, false) => format!("Photos suggest: {}.", top_labels.join(", ")),
        (false, false) => format!(
            "Photos show: {}. Related: {}.",
            top_objects.join(", "),
            top_labels.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::{AnalysisSource, DetectedObject};

    fn object(name: &str, confidence: f64) -> DetectedObject {
        DetectedObject {
            name: name.to_string(),
            confidence,
            bounds: None,
        }
    }

    fn result_with(objects: Vec<DetectedObject>) -> AnalysisResult {
        let mut result = AnalysisResult::empty(AnalysisSource::Remote);
        result.objects = objects;
        result
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(aggregate(&[]).is_err());
    }

    #[test]
    fn test_single_result_identity() {
        let mut single = result_with(vec![object("phone", 0.9), object("case", 0.4)]);
        single.suggested_category = Some(Uuid::new_v4());
        single.suggested_price = Some(70.0);
        single.suggested_condition = Some(ItemCondition::Good);
        single.confidence_scores.insert("category".to_string(), 0.8);
        single.confidence_scores.insert("price".to_string(), 0.7);

        let agg = aggregate(std::slice::from_ref(&single)).expect("aggregate");

        assert_eq!(agg.title, "Phone Case");
        assert_eq!(agg.category_id, single.suggested_category);
        assert!((agg.price.unwrap() - 70.0).abs() < 1e-9);
        assert_eq!(agg.condition, single.suggested_condition);
        assert!((agg.overall_confidence - single.mean_confidence()).abs() < 1e-9);
    }

    #[test]
    fn test_accumulated_object_scores_pick_title() {
        // Spec scenario: phone accumulates 2.4 across three images, case 0.6.
        let results = vec![
            result_with(vec![object("phone", 0.9)]),
            result_with(vec![object("phone", 0.7), object("case", 0.6)]),
            result_with(vec![object("phone", 0.8)]),
        ];

        let agg = aggregate(&results).expect("aggregate");
        assert_eq!(agg.title, "Phone Case");
        assert_eq!(agg.object_scores[0].0, "phone");
        assert!((agg.object_scores[0].1 - 2.4).abs() < 1e-9);
        assert_eq!(agg.object_scores[1].0, "case");
        assert!((agg.object_scores[1].1 - 0.6).abs() < 1e-9);

        let expected_overall = results.iter().map(|r| r.mean_confidence()).sum::<f64>() / 3.0;
        assert!((agg.overall_confidence - expected_overall).abs() < 1e-9);
    }

    #[test]
    fn test_placeholder_title_when_no_objects() {
        let results = vec![AnalysisResult::empty(AnalysisSource::Fallback)];
        let agg = aggregate(&results).expect("aggregate");
        assert_eq!(agg.title, TITLE_PLACEHOLDER);
    }

    #[test]
    fn test_category_winner_permutation_invariant_without_ties() {
        let winner = Uuid::new_v4();
        let loser = Uuid::new_v4();

        let mut a = result_with(vec![object("phone", 0.9)]);
        a.suggested_category = Some(winner);
        a.confidence_scores.insert("category".to_string(), 0.9);

        let mut b = result_with(vec![object("case", 0.5)]);
        b.suggested_category = Some(loser);
        b.confidence_scores.insert("category".to_string(), 0.4);

        let mut c = result_with(vec![object("phone", 0.8)]);
        c.suggested_category = Some(winner);
        c.confidence_scores.insert("category".to_string(), 0.7);

        let forward = aggregate(&[a.clone(), b.clone(), c.clone()]).expect("aggregate");
        let reversed = aggregate(&[c, b, a]).expect("aggregate");

        assert_eq!(forward.category_id, Some(winner));
        assert_eq!(reversed.category_id, Some(winner));
        assert_eq!(forward.price, reversed.price);
        assert_eq!(forward.condition, reversed.condition);
    }

    #[test]
    fn test_exact_ties_break_by_first_seen_order() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let mut a = result_with(vec![]);
        a.suggested_category = Some(first);
        a.confidence_scores.insert("category".to_string(), 0.6);
        a.suggested_condition = Some(ItemCondition::Good);

        let mut b = result_with(vec![]);
        b.suggested_category = Some(second);
        b.confidence_scores.insert("category".to_string(), 0.6);
        b.suggested_condition = Some(ItemCondition::Fair);

        let agg = aggregate(&[a, b]).expect("aggregate");
        assert_eq!(agg.category_id, Some(first));
        assert_eq!(agg.condition, Some(ItemCondition::Good));
    }

    #[test]
    fn test_price_is_confidence_weighted() {
        let mut a = result_with(vec![]);
        a.suggested_price = Some(100.0);
        a.confidence_scores.insert("price".to_string(), 0.9);

        let mut b = result_with(vec![]);
        b.suggested_price = Some(50.0);
        b.confidence_scores.insert("price".to_string(), 0.1);

        let agg = aggregate(&[a, b]).expect("aggregate");
        let expected = (100.0 * 0.9 + 50.0 * 0.1) / 1.0;
        assert!((agg.price.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_price_none_when_no_image_priced() {
        let results = vec![result_with(vec![object("phone", 0.9)])];
        let agg = aggregate(&results).expect("aggregate");
        assert!(agg.price.is_none());
    }

    #[test]
    fn test_default_price_weight_applies_when_score_missing() {
        let mut a = result_with(vec![]);
        a.suggested_price = Some(80.0);
        // No price confidence score recorded: weight defaults to 0.3.

        let mut b = result_with(vec![]);
        b.suggested_price = Some(40.0);
        b.confidence_scores.insert("price".to_string(), 0.6);

        let agg = aggregate(&[a, b]).expect("aggregate");
        let expected = (80.0 * 0.3 + 40.0 * 0.6) / 0.9;
        assert!((agg.price.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_condition_majority_vote() {
        let mut results: Vec<AnalysisResult> = Vec::new();
        for condition in [ItemCondition::Good, ItemCondition::Fair, ItemCondition::Good] {
            let mut r = result_with(vec![]);
            r.suggested_condition = Some(condition);
            results.push(r);
        }

        let agg = aggregate(&results).expect("aggregate");
        assert_eq!(agg.condition, Some(ItemCondition::Good));
    }
}
