//! Skew estimation from edge-point projections and straightening rotation.
//!
//! Edge pixels from a Canny pass are projected onto the normal of each
//! candidate angle. At the true text-line angle the projections pile up
//! into sharp peaks, so the angle whose projection histogram has the
//! largest sum of squared bin counts wins.

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::edges::canny;
use imageproc::geometric_transformations::{warp_with, Interpolation};

/// Estimated angles below this are left uncorrected, in degrees
pub const SKEW_NOISE_FLOOR_DEG: f32 = 0.5;

const MAX_SKEW_DEG: f32 = 15.0;
const ANGLE_STEP_DEG: f32 = 0.1;
const ESTIMATE_WIDTH: u32 = 800;
const MAX_EDGE_POINTS: usize = 40_000;
const MIN_EDGE_POINTS: usize = 20;

/// Result of skew estimation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewEstimate {
    /// Dominant line angle in degrees; positive means lines fall to the right
    pub angle: f32,
    /// Peak prominence in [0, 1]; zero when too few edges were found
    pub confidence: f32,
}

impl SkewEstimate {
    const NONE: SkewEstimate = SkewEstimate {
        angle: 0.0,
        confidence: 0.0,
    };

    /// True when the angle is large enough to be worth correcting
    #[must_use]
    pub fn needs_correction(&self) -> bool {
        self.angle.abs() >= SKEW_NOISE_FLOOR_DEG
    }
}

/// Estimate the dominant text-line angle of a page
#[must_use]
pub fn estimate_skew(gray: &GrayImage) -> SkewEstimate {
    let small = if gray.width() > ESTIMATE_WIDTH {
        DynamicImage::ImageLuma8(gray.clone())
            .resize(ESTIMATE_WIDTH, gray.height(), FilterType::Triangle)
            .to_luma8()
    } else {
        gray.clone()
    };

    let edges = canny(&small, 40.0, 100.0);
    let mut points: Vec<(f32, f32)> = edges
        .enumerate_pixels()
        .filter(|(_, _, px)| px[0] > 0)
        .map(|(x, y, _)| (x as f32, y as f32))
        .collect();
    if points.len() < MIN_EDGE_POINTS {
        return SkewEstimate::NONE;
    }
    if points.len() > MAX_EDGE_POINTS {
        let stride = points.len().div_ceil(MAX_EDGE_POINTS);
        points = points.into_iter().step_by(stride).collect();
    }

    let diag = (small.width() as f32).hypot(small.height() as f32).ceil() as usize;
    let mut bins = vec![0u32; diag * 2 + 1];

    let steps = (MAX_SKEW_DEG / ANGLE_STEP_DEG).round() as i32;
    let mut best_angle = 0.0f32;
    let mut best_score = 0u64;
    let mut score_sum = 0u64;
    let mut evaluated = 0u64;

    // search outward from zero so ties resolve to the smaller angle
    for i in 0..=steps * 2 {
        let k = if i % 2 == 0 { i / 2 } else { -(i + 1) / 2 };
        let angle = k as f32 * ANGLE_STEP_DEG;
        let (sin, cos) = angle.to_radians().sin_cos();

        bins.iter_mut().for_each(|b| *b = 0);
        for &(x, y) in &points {
            let rho = y * cos - x * sin;
            let bin = (rho.round() as i64 + diag as i64).clamp(0, bins.len() as i64 - 1);
            bins[bin as usize] += 1;
        }
        let score: u64 = bins.iter().map(|&c| u64::from(c) * u64::from(c)).sum();
        score_sum += score;
        evaluated += 1;
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    let mean = score_sum as f64 / evaluated.max(1) as f64;
    let confidence = if best_score == 0 {
        0.0
    } else {
        ((best_score as f64 - mean) / best_score as f64) as f32
    };

    SkewEstimate {
        angle: best_angle,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

/// Maps an output pixel to the input pixel that straightens lines tilted by `angle_deg`
fn straighten_mapping(width: u32, height: u32, angle_deg: f32) -> impl Fn(f32, f32) -> (f32, f32) {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    move |x, y| {
        let dx = x - cx;
        let dy = y - cy;
        (cos * dx - sin * dy + cx, sin * dx + cos * dy + cy)
    }
}

/// Rotate so lines tilted by `angle_deg` become horizontal; uncovered corners are white
#[must_use]
pub fn straighten_gray(image: &GrayImage, angle_deg: f32) -> GrayImage {
    let mapping = straighten_mapping(image.width(), image.height(), angle_deg);
    warp_with(image, mapping, Interpolation::Bilinear, Luma([255]))
}

#[must_use]
pub fn straighten_rgb(image: &RgbImage, angle_deg: f32) -> RgbImage {
    let mapping = straighten_mapping(image.width(), image.height(), angle_deg);
    warp_with(image, mapping, Interpolation::Bilinear, Rgb([255, 255, 255]))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White page with thick dark lines sloping by `angle_deg`
    fn ruled_page(angle_deg: f32) -> GrayImage {
        let mut page = GrayImage::from_pixel(400, 320, Luma([255]));
        let slope = angle_deg.to_radians().tan();
        for line in 0..8 {
            let y0 = 40.0 + line as f32 * 30.0;
            for x in 20..380u32 {
                let y = (y0 + x as f32 * slope).round() as u32;
                for t in 0..3 {
                    page.put_pixel(x, y + t, Luma([0]));
                }
            }
        }
        page
    }

    #[test]
    fn test_level_page_has_no_skew() {
        let est = estimate_skew(&ruled_page(0.0));
        assert!(est.angle.abs() < 0.2, "angle {}", est.angle);
        assert!(!est.needs_correction());
    }

    #[test]
    fn test_estimates_and_corrects_tilt() {
        let page = ruled_page(3.0);
        let est = estimate_skew(&page);
        assert!((est.angle - 3.0).abs() <= 0.3, "angle {}", est.angle);
        assert!(est.needs_correction());
        assert!(est.confidence > 0.0);

        let straight = straighten_gray(&page, est.angle);
        assert_eq!(straight.dimensions(), page.dimensions());
        let residual = estimate_skew(&straight);
        assert!(residual.angle.abs() <= 0.3, "residual {}", residual.angle);
    }

    #[test]
    fn test_negative_tilt() {
        let page = {
            let mut page = GrayImage::from_pixel(400, 320, Luma([255]));
            let slope = (-2.0f32).to_radians().tan();
            for line in 0..8 {
                let y0 = 60.0 + line as f32 * 30.0;
                for x in 20..380u32 {
                    let y = (y0 + x as f32 * slope).round() as u32;
                    for t in 0..3 {
                        page.put_pixel(x, y + t, Luma([0]));
                    }
                }
            }
            page
        };
        let est = estimate_skew(&page);
        assert!((est.angle + 2.0).abs() <= 0.3, "angle {}", est.angle);
    }

    #[test]
    fn test_blank_page_estimate() {
        let page = GrayImage::from_pixel(100, 100, Luma([255]));
        assert_eq!(estimate_skew(&page), SkewEstimate::NONE);
    }
}
