use image::GenericImageView;

use crate::models::analysis::{AnalysisResult, AnalysisSource, DominantColor, ImageLabel};

/// Confidence assigned to filename-derived pattern labels. Everything the
/// fallback produces stays at or below this value.
pub const PATTERN_LABEL_CONFIDENCE: f64 = 0.6;

/// Confidence for image-metadata labels.
const METADATA_LABEL_CONFIDENCE: f64 = 0.4;

/// Number of dominant colors reported.
const TOP_COLORS: usize = 5;

/// Target sample count for the color histogram grid.
const COLOR_SAMPLE_TARGET: u32 = 10_000;

/// Filename keyword patterns, matched case-insensitively against the
/// original filename as a last-resort labeling signal.
const FILENAME_PATTERNS: &[(&str, &str)] = &[
    ("iphone", "phone"),
    ("phone", "phone"),
    ("laptop", "laptop"),
    ("macbook", "laptop"),
    ("camera", "camera"),
    ("watch", "watch"),
    ("sofa", "sofa"),
    ("couch", "sofa"),
    ("chair", "chair"),
    ("table", "table"),
    ("desk", "desk"),
    ("bike", "bicycle"),
    ("bicycle", "bicycle"),
    ("book", "book"),
    ("shoe", "shoes"),
    ("sneaker", "shoes"),
    ("guitar", "guitar"),
    ("tv", "television"),
    ("television", "television"),
    ("dress", "dress"),
    ("jacket", "jacket"),
    ("lamp", "lamp"),
    ("toy", "toy"),
];

/// Local analysis used when the remote provider is disabled or failed.
/// Produces image metadata, a quantized dominant-color histogram and
/// filename pattern labels. Unreadable bytes are the only fatal case.
pub fn analyze_fallback(
    image_bytes: &[u8],
    filename: Option<&str>,
) -> Result<AnalysisResult, FallbackError> {
    let img = image::load_from_memory(image_bytes).map_err(FallbackError::InvalidImage)?;
    let (width, height) = img.dimensions();

    let mut result = AnalysisResult::empty(AnalysisSource::Fallback);

    // Basic metadata as low-confidence labels.
    if let Ok(format) = image::guess_format(image_bytes) {
        result.labels.push(ImageLabel {
            name: format!("{:?} image", format).to_lowercase(),
            confidence: METADATA_LABEL_CONFIDENCE,
        });
    }
    result.labels.push(ImageLabel {
        name: if width >= height { "landscape photo" } else { "portrait photo" }.to_string(),
        confidence: METADATA_LABEL_CONFIDENCE,
    });

    result.dominant_colors = dominant_colors(&img.to_rgb8(), TOP_COLORS);

    if let Some(name) = filename {
        result.labels.extend(filename_labels(name));
    }

    Ok(result)
}

/// Quantized dominant-color histogram: sample pixels on a grid proportional
/// to image size, quantize each channel into 32-level buckets, rank buckets
/// by pixel coverage.
fn dominant_colors(rgb: &image::RgbImage, top_k: usize) -> Vec<DominantColor> {
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let pixels = width as u64 * height as u64;
    let step = ((pixels / COLOR_SAMPLE_TARGET as u64) as f64).sqrt().ceil().max(1.0) as u32;

    let mut counts: std::collections::HashMap<(u8, u8, u8), u64> = std::collections::HashMap::new();
    let mut sampled: u64 = 0;

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let p = rgb.get_pixel(x, y);
            // 32 levels per channel: bucket width 8, representative midpoint.
            let bucket = (p[0] / 8, p[1] / 8, p[2] / 8);
            *counts.entry(bucket).or_insert(0) += 1;
            sampled += 1;
            x += step;
        }
        y += step;
    }

    if sampled == 0 {
        return Vec::new();
    }

    let mut buckets: Vec<((u8, u8, u8), u64)> = counts.into_iter().collect();
    buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    buckets
        .into_iter()
        .take(top_k)
        .map(|((r, g, b), count)| {
            let fraction = count as f64 / sampled as f64;
            DominantColor {
                red: r * 8 + 4,
                green: g * 8 + 4,
                blue: b * 8 + 4,
                score: fraction,
                pixel_fraction: fraction,
            }
        })
        .collect()
}

/// Keyword-pattern labels derived from the original filename.
fn filename_labels(filename: &str) -> Vec<ImageLabel> {
    let lowered = filename.to_lowercase();
    let mut labels = Vec::new();

    for (pattern, label) in FILENAME_PATTERNS {
        if lowered.contains(pattern) && !labels.iter().any(|l: &ImageLabel| l.name == *label) {
            labels.push(ImageLabel {
                name: (*label).to_string(),
                confidence: PATTERN_LABEL_CONFIDENCE,
            });
        }
    }

    labels
}

/// Human-readable name for the closest basic color, used in generated
/// descriptions.
pub fn color_name(color: &DominantColor) -> &'static str {
    const NAMED: &[(&str, (u8, u8, u8))] = &[
        ("black", (0, 0, 0)),
        ("white", (255, 255, 255)),
        ("gray", (128, 128, 128)),
        ("red", (200, 30, 30)),
        ("orange", (240, 140, 20)),
        ("yellow", (230, 220, 50)),
        ("green", (40, 160, 60)),
        ("blue", (40, 80, 200)),
        ("purple", (130, 60, 180)),
        ("pink", (240, 130, 180)),
        ("brown", (130, 85, 40)),
        ("beige", (215, 195, 160)),
    ];

    let mut best = NAMED[0].0;
    let mut best_dist = u32::MAX;
    for (name, (r, g, b)) in NAMED {
        let dr = color.red.abs_diff(*r) as u32;
        let dg = color.green.abs_diff(*g) as u32;
        let db = color.blue.abs_diff(*b) as u32;
        let dist = dr * dr + dg * dg + db * db;
        if dist < best_dist {
            best_dist = dist;
            best = name;
        }
    }
    best
}

#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("unreadable image bytes: {0}")]
    InvalidImage(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb(color));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut bytes, image::ImageFormat::Png)
            .expect("encode");
        bytes.into_inner()
    }

    #[test]
    fn test_invalid_bytes_rejected() {
        let err = analyze_fallback(b"not an image", None);
        assert!(matches!(err, Err(FallbackError::InvalidImage(_))));
    }

    #[test]
    fn test_solid_image_yields_single_dominant_color() {
        let bytes = png_bytes(64, 64, [250, 10, 10]);
        let result = analyze_fallback(&bytes, None).expect("analyze");

        assert_eq!(result.dominant_colors.len(), 1);
        let top = &result.dominant_colors[0];
        assert!((top.pixel_fraction - 1.0).abs() < 1e-9);
        // Bucket midpoint for channel value 250 is 31*8+4.
        assert_eq!(top.red, 252);
        assert_eq!(color_name(top), "red");
    }

    #[test]
    fn test_filename_patterns_label_at_fixed_confidence() {
        let bytes = png_bytes(8, 8, [0, 0, 0]);
        let result = analyze_fallback(&bytes, Some("IMG_iphone_13.jpg")).expect("analyze");

        let phone = result.labels.iter().find(|l| l.name == "phone").expect("phone label");
        assert_eq!(phone.confidence, PATTERN_LABEL_CONFIDENCE);
    }

    #[test]
    fn test_all_fallback_confidences_bounded() {
        let bytes = png_bytes(32, 16, [12, 200, 80]);
        let result = analyze_fallback(&bytes, Some("green_sofa.png")).expect("analyze");

        assert!(result
            .labels
            .iter()
            .all(|l| l.confidence <= PATTERN_LABEL_CONFIDENCE));
        assert!(result.objects.is_empty());
    }
}
