// THEORY:
// The imagery service republishes the same strip for long stretches of the night.
// Re-scoring an unchanged strip wastes a full feature-extractor pass and re-captures
// the same crossings, so a run first compares the new strip with the previous one.
//
// The comparison is deliberately crude: a small grayscale thumbnail (largest side
// 64 px, aspect kept) compared by mean absolute difference and expressed as a
// similarity percentage. Thumbnails of different shapes are not comparable and
// score 0.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

pub const DEFAULT_MAX_DIM: u32 = 64;
/// Similarity at or above which a new strip counts as unchanged.
pub const STRIP_DUPLICATE_THRESHOLD: f64 = 98.0;

/// Grayscale thumbnail used to compare two images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSignature {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u8>,
}

impl ImageSignature {
    pub fn from_image(image: &RgbImage, max_dim: u32) -> Self {
        let (w, h) = image.dimensions();
        let (new_w, new_h) = if w > h {
            (max_dim, ((h as u64 * max_dim as u64) / w.max(1) as u64).max(1) as u32)
        } else {
            (((w as u64 * max_dim as u64) / h.max(1) as u64).max(1) as u32, max_dim)
        };
        let gray = DynamicImage::ImageRgb8(image.clone()).into_luma8();
        let thumb = imageops::resize(&gray, new_w, new_h, FilterType::Lanczos3);
        Self {
            width: new_w,
            height: new_h,
            samples: thumb.into_raw(),
        }
    }

    /// Similarity in percent: 100 is identical, 0 is maximally different.
    pub fn similarity(&self, other: &ImageSignature) -> f64 {
        if self.samples.len() != other.samples.len() || self.samples.is_empty() {
            return 0.0;
        }
        let total_diff: u64 = self
            .samples
            .iter()
            .zip(&other.samples)
            .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs() as u64)
            .sum();
        let max_diff = 255.0 * self.samples.len() as f64;
        100.0 * (1.0 - total_diff as f64 / max_diff)
    }

    pub fn is_duplicate_of(&self, other: &ImageSignature, threshold: f64) -> bool {
        self.similarity(other) >= threshold
    }
}
