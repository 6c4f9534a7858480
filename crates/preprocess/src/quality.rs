//! Heuristic page quality metrics.
//!
//! The score is a readability heuristic, not a calibrated measure: it
//! rewards global contrast and a clean split between ink and paper and
//! penalizes residual skew.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Quality measurements taken before and after enhancement
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Skew detected on the input, in degrees
    pub skew_angle: f32,
    /// Whether a straightening rotation was applied
    pub skew_corrected: bool,
    /// Skew measured on the output, in degrees
    pub residual_skew: f32,
    /// RMS contrast (luminance standard deviation) of the input
    pub contrast_before: f32,
    /// RMS contrast of the output
    pub contrast_after: f32,
    pub contrast_delta: f32,
    pub quality_before: f32,
    /// Heuristic score in [0, 100] for the output
    pub quality_score: f32,
    /// Binarization level used, if any
    pub threshold_level: Option<u8>,
}

/// Standard deviation of the luminance
#[must_use]
pub fn rms_contrast(gray: &GrayImage) -> f32 {
    let n = gray.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let mean = gray.iter().map(|&p| f64::from(p)).sum::<f64>() / n as f64;
    let var = gray
        .iter()
        .map(|&p| {
            let d = f64::from(p) - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    var.sqrt() as f32
}

/// Fraction of pixels that are clearly ink (< 64) or clearly paper (> 192)
#[must_use]
pub fn tonal_separation(gray: &GrayImage) -> f32 {
    let n = gray.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let separated = gray.iter().filter(|&&p| p < 64 || p > 192).count();
    separated as f32 / n as f32
}

/// Combined score in [0, 100]
#[must_use]
pub fn quality_score(gray: &GrayImage, skew_deg: f32) -> f32 {
    let contrast = (rms_contrast(gray) / 127.5).min(1.0);
    let skew_penalty = (skew_deg.abs() * 5.0).min(30.0);
    (75.0 * contrast + 25.0 * tonal_separation(gray) - skew_penalty).clamp(0.0, 100.0)
}
