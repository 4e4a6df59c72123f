use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::catalog::ItemCondition;

/// Where an analysis came from: the remote vision provider or the local
/// fallback analyzer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Remote,
    Fallback,
}

/// Axis-aligned bounding box in normalized [0, 1] coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

/// A localized object detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub name: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

/// A whole-image label (no localization).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageLabel {
    pub name: String,
    pub confidence: f64,
}

/// A recognized text span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

/// A dominant color with its share of the image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DominantColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub score: f64,
    pub pixel_fraction: f64,
}

/// A recognized landmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub confidence: f64,
}

/// Safe-search severity as reported by the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

/// Structured analysis of a single image, plus the listing fields derived
/// from it. Immutable once produced; cached by content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub objects: Vec<DetectedObject>,
    pub labels: Vec<ImageLabel>,
    pub text_fragments: Vec<TextFragment>,
    pub dominant_colors: Vec<DominantColor>,
    pub landmarks: Vec<Landmark>,
    pub faces_present: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub explicit_content: HashMap<String, Severity>,

    pub suggested_category: Option<Uuid>,
    pub suggested_title: Option<String>,
    pub suggested_description: Option<String>,
    pub suggested_price: Option<f64>,
    /// ±20% band around the suggested price.
    pub price_range: Option<(f64, f64)>,
    pub suggested_condition: Option<ItemCondition>,

    /// Per-field confidence, each clamped to [0.1, 0.95].
    #[serde(default)]
    pub confidence_scores: HashMap<String, f64>,

    pub source: AnalysisSource,
}

impl AnalysisResult {
    /// Empty result shell with the given source; detections and derived
    /// fields are filled in by the provider.
    pub fn empty(source: AnalysisSource) -> Self {
        Self {
            objects: Vec::new(),
            labels: Vec::new(),
            text_fragments: Vec::new(),
            dominant_colors: Vec::new(),
            landmarks: Vec::new(),
            faces_present: false,
            explicit_content: HashMap::new(),
            suggested_category: None,
            suggested_title: None,
            suggested_description: None,
            suggested_price: None,
            price_range: None,
            suggested_condition: None,
            confidence_scores: HashMap::new(),
            source,
        }
    }

    /// Mean of this result's own per-field confidence scores, or 0.0 when
    /// none were computed.
    pub fn mean_confidence(&self) -> f64 {
        if self.confidence_scores.is_empty() {
            return 0.0;
        }
        self.confidence_scores.values().sum::<f64>() / self.confidence_scores.len() as f64
    }
}
