//! Enhancement options and their validation.

use crate::PreprocessError;
use serde::{Deserialize, Serialize};

/// Threshold value requesting Otsu's automatic level
pub const AUTO_THRESHOLD: i32 = -1;

/// Per-image enhancement options
///
/// `threshold` is a binarization level in `0..=255`, [`AUTO_THRESHOLD`] for
/// Otsu, or any other negative value to disable thresholding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    pub grayscale: bool,
    pub contrast: i32,
    pub brightness: i32,
    pub threshold: i32,
    pub denoise: bool,
    pub deskew: bool,
    pub remove_borders: bool,
    pub detect_table: bool,
    pub fast_mode: bool,
    pub return_steps: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            grayscale: true,
            contrast: 20,
            brightness: 0,
            threshold: AUTO_THRESHOLD,
            denoise: true,
            deskew: true,
            remove_borders: true,
            detect_table: false,
            fast_mode: false,
            return_steps: false,
        }
    }
}

impl PreprocessOptions {
    /// Options that leave the image untouched
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            grayscale: false,
            contrast: 0,
            brightness: 0,
            threshold: -2,
            denoise: false,
            deskew: false,
            remove_borders: false,
            detect_table: false,
            fast_mode: false,
            return_steps: false,
        }
    }

    pub fn validate(&self) -> Result<(), PreprocessError> {
        check_range("contrast", self.contrast, -100, 100)?;
        check_range("brightness", self.brightness, -100, 100)?;
        if self.threshold > 255 {
            return Err(PreprocessError::InvalidOption {
                name: "threshold",
                value: self.threshold,
                allowed: "-1 (auto), 0..=255, or negative to disable",
            });
        }
        Ok(())
    }

    /// Fixed binarization level, `Some(None)` for Otsu, `None` when disabled
    #[must_use]
    pub fn threshold_mode(&self) -> Option<Option<u8>> {
        match self.threshold {
            AUTO_THRESHOLD => Some(None),
            t if (0..=255).contains(&t) => Some(Some(t as u8)),
            _ => None,
        }
    }
}

fn check_range(name: &'static str, value: i32, min: i32, max: i32) -> Result<(), PreprocessError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(PreprocessError::InvalidOption {
            name,
            value,
            allowed: "-100..=100",
        })
    }
}
