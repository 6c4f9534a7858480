//! Grayscale conversion and brightness/contrast remapping.

use image::{GrayImage, Luma, RgbImage};

/// Luminance with 0.299 R + 0.587 G + 0.114 B weighting
#[must_use]
pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);
    for (x, y, px) in image.enumerate_pixels() {
        let [r, g, b] = px.0;
        let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
        gray.put_pixel(x, y, Luma([luma.round().clamp(0.0, 255.0) as u8]));
    }
    gray
}

/// Standard contrast factor for `contrast` in `-100..=100`
#[must_use]
pub fn contrast_factor(contrast: i32) -> f32 {
    let c = contrast as f32;
    259.0 * (c + 255.0) / (255.0 * (259.0 - c))
}

/// Remap one level: brightness offset first, then contrast around mid-gray.
///
/// `brightness` is a percentage of the full range, so +100 adds 255.
#[must_use]
pub fn adjust_value(value: f32, brightness: i32, contrast: i32) -> f32 {
    let shifted = value + brightness as f32 * 2.55;
    (contrast_factor(contrast) * (shifted - 128.0) + 128.0).clamp(0.0, 255.0)
}

/// Lookup table of [`adjust_value`] for every input level
#[must_use]
pub fn level_table(brightness: i32, contrast: i32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (level, slot) in lut.iter_mut().enumerate() {
        *slot = adjust_value(level as f32, brightness, contrast).round() as u8;
    }
    lut
}

pub fn apply_table_gray(image: &mut GrayImage, lut: &[u8; 256]) {
    for px in image.iter_mut() {
        *px = lut[*px as usize];
    }
}

pub fn apply_table_rgb(image: &mut RgbImage, lut: &[u8; 256]) {
    for px in image.iter_mut() {
        *px = lut[*px as usize];
    }
}
