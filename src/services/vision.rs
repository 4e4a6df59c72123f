use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::analysis::{
    AnalysisResult, AnalysisSource, BoundingBox, DetectedObject, DominantColor, ImageLabel,
    Landmark, Severity, TextFragment,
};

/// Detection features requested in the batched annotate call.
const FEATURES: &[(&str, u32)] = &[
    ("OBJECT_LOCALIZATION", 10),
    ("LABEL_DETECTION", 10),
    ("TEXT_DETECTION", 10),
    ("IMAGE_PROPERTIES", 1),
    ("LANDMARK_DETECTION", 5),
    ("FACE_DETECTION", 5),
    ("SAFE_SEARCH_DETECTION", 1),
];

/// Client for the remote vision provider's batched annotate API.
pub struct VisionClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl VisionClient {
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self, VisionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(VisionError::Http)?;

        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    /// Send one batched request covering all detection features and parse
    /// the per-feature annotation lists into an `AnalysisResult` shell
    /// (detections only; suggestion derivation happens downstream).
    pub async fn annotate(&self, image_bytes: &[u8]) -> Result<AnalysisResult, VisionError> {
        let features: Vec<serde_json::Value> = FEATURES
            .iter()
            .map(|(kind, max)| serde_json::json!({ "type": kind, "maxResults": max }))
            .collect();

        let request_body = serde_json::json!({
            "requests": [{
                "image": {
                    "content": base64::engine::general_purpose::STANDARD.encode(image_bytes)
                },
                "features": features
            }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body)
            .send()
            .await
            .map_err(VisionError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(VisionError::Status(status.as_u16()));
        }

        let body: AnnotateResponse = response.json().await.map_err(VisionError::Http)?;

        // Absence of a feature key means zero detections; absence of the
        // top-level container means the provider misbehaved.
        let annotations = body
            .responses
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or(VisionError::MissingResponse)?;

        Ok(annotations.into_result())
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AnnotateResponse {
    responses: Option<Vec<ImageAnnotations>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ImageAnnotations {
    #[serde(default)]
    localized_object_annotations: Vec<ObjectAnnotation>,
    #[serde(default)]
    label_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    image_properties_annotation: Option<ImageProperties>,
    #[serde(default)]
    landmark_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    face_annotations: Vec<serde_json::Value>,
    #[serde(default)]
    safe_search_annotation: Option<SafeSearchAnnotation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectAnnotation {
    name: String,
    score: f64,
    #[serde(default)]
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundingPoly {
    #[serde(default)]
    normalized_vertices: Vec<Vertex>,
}

#[derive(Deserialize, Default, Clone, Copy)]
struct Vertex {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityAnnotation {
    description: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageProperties {
    #[serde(default)]
    dominant_colors: Option<DominantColorsAnnotation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DominantColorsAnnotation {
    #[serde(default)]
    colors: Vec<ColorInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColorInfo {
    color: RgbColor,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    pixel_fraction: f64,
}

#[derive(Deserialize, Default)]
struct RgbColor {
    #[serde(default)]
    red: f64,
    #[serde(default)]
    green: f64,
    #[serde(default)]
    blue: f64,
}

#[derive(Deserialize)]
struct SafeSearchAnnotation {
    #[serde(default)]
    adult: Option<String>,
    #[serde(default)]
    spoof: Option<String>,
    #[serde(default)]
    medical: Option<String>,
    #[serde(default)]
    violence: Option<String>,
    #[serde(default)]
    racy: Option<String>,
}

fn poly_to_bounds(poly: &Option<BoundingPoly>) -> Option<BoundingBox> {
    let vertices = &poly.as_ref()?.normalized_vertices;
    if vertices.is_empty() {
        return None;
    }

    let (mut x_min, mut y_min) = (f64::MAX, f64::MAX);
    let (mut x_max, mut y_max) = (f64::MIN, f64::MIN);
    for v in vertices {
        x_min = x_min.min(v.x);
        y_min = y_min.min(v.y);
        x_max = x_max.max(v.x);
        y_max = y_max.max(v.y);
    }

    Some(BoundingBox {
        x_min,
        y_min,
        x_max,
        y_max,
    })
}

fn parse_severity(value: &str) -> Option<Severity> {
    match value {
        "VERY_UNLIKELY" => Some(Severity::VeryUnlikely),
        "UNLIKELY" => Some(Severity::Unlikely),
        "POSSIBLE" => Some(Severity::Possible),
        "LIKELY" => Some(Severity::Likely),
        "VERY_LIKELY" => Some(Severity::VeryLikely),
        _ => None,
    }
}

impl ImageAnnotations {
    fn into_result(self) -> AnalysisResult {
        let mut result = AnalysisResult::empty(AnalysisSource::Remote);

        result.objects = self
            .localized_object_annotations
            .iter()
            .map(|o| DetectedObject {
                name: o.name.clone(),
                confidence: o.score,
                bounds: poly_to_bounds(&o.bounding_poly),
            })
            .collect();

        result.labels = self
            .label_annotations
            .iter()
            .map(|l| ImageLabel {
                name: l.description.clone(),
                confidence: l.score,
            })
            .collect();

        result.text_fragments = self
            .text_annotations
            .iter()
            .map(|t| TextFragment {
                text: t.description.clone(),
                confidence: t.score,
                bounds: poly_to_bounds(&t.bounding_poly),
            })
            .collect();

        result.dominant_colors = self
            .image_properties_annotation
            .and_then(|p| p.dominant_colors)
            .map(|dc| {
                dc.colors
                    .iter()
                    .map(|c| DominantColor {
                        red: c.color.red.clamp(0.0, 255.0) as u8,
                        green: c.color.green.clamp(0.0, 255.0) as u8,
                        blue: c.color.blue.clamp(0.0, 255.0) as u8,
                        score: c.score,
                        pixel_fraction: c.pixel_fraction,
                    })
                    .collect()
            })
            .unwrap_or_default();

        result.landmarks = self
            .landmark_annotations
            .iter()
            .map(|l| Landmark {
                name: l.description.clone(),
                confidence: l.score,
            })
            .collect();

        result.faces_present = !self.face_annotations.is_empty();

        if let Some(safe) = self.safe_search_annotation {
            for (category, value) in [
                ("adult", safe.adult),
                ("spoof", safe.spoof),
                ("medical", safe.medical),
                ("violence", safe.violence),
                ("racy", safe.racy),
            ] {
                if let Some(severity) = value.as_deref().and_then(parse_severity) {
                    result.explicit_content.insert(category.to_string(), severity);
                }
            }
        }

        result
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("provider response missing the annotations container")]
    MissingResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_feature_keys_mean_zero_detections() {
        let body: AnnotateResponse =
            serde_json::from_str(r#"{"responses":[{}]}"#).expect("parse");
        let result = body.responses.unwrap().remove(0).into_result();
        assert!(result.objects.is_empty());
        assert!(result.labels.is_empty());
        assert!(!result.faces_present);
    }

    #[test]
    fn test_parses_object_and_label_annotations() {
        let raw = r#"{
            "responses": [{
                "localizedObjectAnnotations": [
                    {"name": "Phone", "score": 0.91, "boundingPoly": {"normalizedVertices": [{"x": 0.1, "y": 0.2}, {"x": 0.8, "y": 0.9}]}}
                ],
                "labelAnnotations": [{"description": "electronics", "score": 0.85}],
                "safeSearchAnnotation": {"adult": "VERY_UNLIKELY", "racy": "UNLIKELY"}
            }]
        }"#;
        let body: AnnotateResponse = serde_json::from_str(raw).expect("parse");
        let result = body.responses.unwrap().remove(0).into_result();

        assert_eq!(result.objects.len(), 1);
        assert_eq!(result.objects[0].name, "Phone");
        let bounds = result.objects[0].bounds.expect("bounds");
        assert!((bounds.x_max - 0.8).abs() < 1e-9);
        assert_eq!(result.labels[0].name, "electronics");
        assert_eq!(
            result.explicit_content.get("adult"),
            Some(&Severity::VeryUnlikely)
        );
    }
}
