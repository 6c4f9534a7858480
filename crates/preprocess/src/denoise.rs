//! Noise suppression: a median filter for fast mode and a patch-based
//! non-local means filter for accurate mode.

use image::{GrayImage, RgbImage};
use imageproc::filter::median_filter;
use rayon::prelude::*;

const PATCH_RADIUS: i64 = 1;
const SEARCH_RADIUS: i64 = 3;
const FILTER_STRENGTH: f32 = 12.0;

#[must_use]
pub fn median_gray(image: &GrayImage) -> GrayImage {
    median_filter(image, 1, 1)
}

#[must_use]
pub fn median_rgb(image: &RgbImage) -> RgbImage {
    median_filter(image, 1, 1)
}

/// Non-local means over a 7x7 search window with 3x3 patches.
///
/// Rows are filtered in parallel.
#[must_use]
pub fn non_local_means(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (i64::from(width), i64::from(height));
    let src = image.as_raw();
    let at = |x: i64, y: i64| -> f32 {
        let cx = x.clamp(0, w - 1);
        let cy = y.clamp(0, h - 1);
        f32::from(src[(cy * w + cx) as usize])
    };

    let patch_len = ((2 * PATCH_RADIUS + 1) * (2 * PATCH_RADIUS + 1)) as f32;
    let h2 = FILTER_STRENGTH * FILTER_STRENGTH;

    let mut out = vec![0u8; src.len()];
    out.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i64;
            for (x, slot) in row.iter_mut().enumerate() {
                let x = x as i64;
                let mut weight_sum = 0.0f32;
                let mut value_sum = 0.0f32;

                for sy in (y - SEARCH_RADIUS)..=(y + SEARCH_RADIUS) {
                    for sx in (x - SEARCH_RADIUS)..=(x + SEARCH_RADIUS) {
                        let mut dist = 0.0f32;
                        for py in -PATCH_RADIUS..=PATCH_RADIUS {
                            for px in -PATCH_RADIUS..=PATCH_RADIUS {
                                let d = at(x + px, y + py) - at(sx + px, sy + py);
                                dist += d * d;
                            }
                        }
                        let weight = (-(dist / patch_len) / h2).exp();
                        weight_sum += weight;
                        value_sum += weight * at(sx, sy);
                    }
                }
                *slot = (value_sum / weight_sum).round().clamp(0.0, 255.0) as u8;
            }
        });

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| image.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn speckled(width: u32, height: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(width, height, Luma([200]));
        for (i, (x, y)) in [(5, 5), (12, 7), (20, 15), (3, 18)].into_iter().enumerate() {
            img.put_pixel(x, y, Luma([if i % 2 == 0 { 0 } else { 255 }]));
        }
        img
    }

    #[test]
    fn test_median_removes_isolated_specks() {
        let out = median_gray(&speckled(24, 24));
        assert!(out.iter().all(|&p| p == 200));
    }

    #[test]
    fn test_nlm_preserves_flat_regions_and_size() {
        let flat = GrayImage::from_pixel(16, 12, Luma([90]));
        let out = non_local_means(&flat);
        assert_eq!(out.dimensions(), (16, 12));
        assert!(out.iter().all(|&p| p == 90));
    }

    #[test]
    fn test_nlm_keeps_strong_edges() {
        let mut img = GrayImage::from_pixel(20, 20, Luma([240]));
        for y in 0..20 {
            for x in 0..10 {
                img.put_pixel(x, y, Luma([20]));
            }
        }
        let out = non_local_means(&img);
        assert!(out.get_pixel(2, 10)[0] < 40);
        assert!(out.get_pixel(17, 10)[0] > 220);
    }
}
