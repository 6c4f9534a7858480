//! Intensity histograms and global thresholding shared by the image stages.

use image::GrayImage;

/// 256-bin intensity histogram
#[must_use]
pub fn histogram(image: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for px in image.as_raw() {
        hist[*px as usize] += 1;
    }
    hist
}

/// Otsu's threshold: the level maximizing between-class variance.
///
/// Pixels `<= level` form the dark class. When the maximum spans a plateau
/// (empty bins between two modes) the middle of the plateau is returned.
#[must_use]
pub fn otsu_threshold(hist: &[u64; 256]) -> u8 {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 127;
    }
    let total = total as f64;
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut weight_bg = 0.0f64;
    let mut sum_bg = 0.0f64;
    let mut best_variance = -1.0f64;
    let mut first_best = 0usize;
    let mut last_best = 0usize;

    for (level, &count) in hist.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += level as f64 * count as f64;

        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let diff = mean_bg - mean_fg;
        let variance = weight_bg * weight_fg * diff * diff;

        if variance > best_variance * (1.0 + 1e-12) {
            best_variance = variance;
            first_best = level;
            last_best = level;
        } else if (variance - best_variance).abs() <= best_variance * 1e-12 {
            last_best = level;
        }
    }

    ((first_best + last_best) / 2) as u8
}

/// Pixels above `level` become white, the rest black
#[must_use]
pub fn binarize(image: &GrayImage, level: u8) -> GrayImage {
    let mut out = image.clone();
    for px in out.iter_mut() {
        *px = if *px > level { 255 } else { 0 };
    }
    out
}

/// Binarize at the Otsu level of the image; returns the image and the level
#[must_use]
pub fn binarize_otsu(image: &GrayImage) -> (GrayImage, u8) {
    let level = otsu_threshold(&histogram(image));
    (binarize(image, level), level)
}
