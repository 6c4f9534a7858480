//! Page enhancement for scanned land records
//!
//! The [`ImagePreprocessor`] applies a fixed pixel pipeline to one page:
//! grayscale, denoise, brightness/contrast, deskew, threshold and speckle
//! cleanup. Each stage is optional. The result carries the enhanced page,
//! optional named snapshots of every applied stage, quality metrics and,
//! when requested, the ruled table detected on the enhanced page.
//!
//! # Example
//! ```no_run
//! use landrec_preprocess::{decode_page, ImagePreprocessor, PagePreprocessor, PreprocessOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("patta_0042.png")?;
//! let page = decode_page(&bytes)?;
//! let output = ImagePreprocessor::default().preprocess(&page, &PreprocessOptions::default())?;
//! println!("quality {:.1}", output.metrics.quality_score);
//! # Ok(())
//! # }
//! ```

pub mod adjust;
pub mod denoise;
pub mod deskew;
pub mod options;
pub mod quality;

#[cfg(feature = "pdf")]
pub mod pdf;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;
use landrec_common::levels::{binarize, histogram, otsu_threshold};
use landrec_common::{ProcessingError, TableStructure};
use landrec_table_detector::TableDetector;
use thiserror::Error;
use tracing::debug;

pub use deskew::{SkewEstimate, SKEW_NOISE_FLOOR_DEG};
pub use options::{PreprocessOptions, AUTO_THRESHOLD};
pub use quality::QualityMetrics;

/// Fast mode works on pages no wider than this
pub const FAST_MODE_MAX_WIDTH: u32 = 1600;

/// Rasterization resolution for PDF input
pub const PDF_RENDER_DPI: f32 = 220.0;

/// Errors that can occur during preprocessing
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Invalid option {name}: {value} (allowed {allowed})")]
    InvalidOption {
        name: &'static str,
        value: i32,
        allowed: &'static str,
    },

    #[error("Transform backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Failed to decode page: {0}")]
    Decode(String),

    #[error("Transform failed: {0}")]
    Transform(String),
}

impl From<PreprocessError> for ProcessingError {
    fn from(err: PreprocessError) -> Self {
        match err {
            PreprocessError::BackendUnavailable(msg) => ProcessingError::BackendUnavailable(msg),
            PreprocessError::Decode(msg) => ProcessingError::ImageError(msg),
            PreprocessError::Transform(msg) => ProcessingError::Transform(msg),
            other => ProcessingError::Transform(other.to_string()),
        }
    }
}

/// Decode raw file bytes into a page image; PDFs yield their first page
pub fn decode_page(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    if bytes.starts_with(b"%PDF") {
        return decode_pdf(bytes);
    }
    image::load_from_memory(bytes).map_err(|e| PreprocessError::Decode(e.to_string()))
}

#[cfg(feature = "pdf")]
fn decode_pdf(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    pdf::render_first_page(bytes, PDF_RENDER_DPI)
}

#[cfg(not(feature = "pdf"))]
fn decode_pdf(_bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    Err(PreprocessError::BackendUnavailable(
        "PDF rasterization is not enabled (build with the `pdf` feature)".to_string(),
    ))
}

/// Named intermediate image
#[derive(Debug, Clone)]
pub struct ProcessingStep {
    pub name: &'static str,
    pub image: DynamicImage,
}

/// Output of one preprocessing pass
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    /// Enhanced page at the input resolution
    pub image: DynamicImage,
    /// Snapshots after each applied stage, empty unless requested
    pub steps: Vec<ProcessingStep>,
    pub metrics: QualityMetrics,
    pub table: Option<TableStructure>,
}

/// A page enhancement backend.
///
/// Implementations may run in-process or delegate to a service; an
/// unreachable backend must report [`PreprocessError::BackendUnavailable`]
/// instead of returning the page unchanged.
pub trait PagePreprocessor: Send + Sync {
    fn preprocess(
        &self,
        page: &DynamicImage,
        options: &PreprocessOptions,
    ) -> Result<PreprocessOutput, PreprocessError>;
}

/// In-process enhancement pipeline
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    detector: TableDetector,
}

impl ImagePreprocessor {
    #[must_use]
    pub fn new(detector: TableDetector) -> Self {
        Self { detector }
    }
}

/// Page being worked on, grayscale or color
enum Working {
    Gray(GrayImage),
    Color(RgbImage),
}

impl Working {
    fn luma(&self) -> GrayImage {
        match self {
            Working::Gray(g) => g.clone(),
            Working::Color(c) => adjust::to_grayscale(c),
        }
    }

    fn into_luma(self) -> GrayImage {
        match self {
            Working::Gray(g) => g,
            Working::Color(c) => adjust::to_grayscale(&c),
        }
    }

    fn to_dynamic(&self) -> DynamicImage {
        match self {
            Working::Gray(g) => DynamicImage::ImageLuma8(g.clone()),
            Working::Color(c) => DynamicImage::ImageRgb8(c.clone()),
        }
    }

    fn into_dynamic(self) -> DynamicImage {
        match self {
            Working::Gray(g) => DynamicImage::ImageLuma8(g),
            Working::Color(c) => DynamicImage::ImageRgb8(c),
        }
    }
}

struct StepRecorder {
    enabled: bool,
    steps: Vec<ProcessingStep>,
}

impl StepRecorder {
    fn record(&mut self, name: &'static str, work: &Working) {
        if self.enabled {
            self.steps.push(ProcessingStep {
                name,
                image: work.to_dynamic(),
            });
        }
    }
}

/// Close the ink layer: fill pinholes and small breaks in dark strokes
fn clean_speckles(page: &GrayImage) -> GrayImage {
    let mut ink = page.clone();
    image::imageops::invert(&mut ink);
    let mut closed = close(&ink, Norm::LInf, 1);
    image::imageops::invert(&mut closed);
    closed
}

fn luma_of(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(g) => g.clone(),
        other => adjust::to_grayscale(&other.to_rgb8()),
    }
}

impl PagePreprocessor for ImagePreprocessor {
    fn preprocess(
        &self,
        page: &DynamicImage,
        options: &PreprocessOptions,
    ) -> Result<PreprocessOutput, PreprocessError> {
        options.validate()?;
        let (width, height) = page.dimensions();
        if width == 0 || height == 0 {
            return Err(PreprocessError::Transform(format!(
                "Page dimensions must be non-zero (got {}x{})",
                width, height
            )));
        }

        let fast = options.fast_mode;
        let source = if fast && width > FAST_MODE_MAX_WIDTH {
            debug!("Fast mode: downsampling {}px wide page", width);
            page.resize(FAST_MODE_MAX_WIDTH, height, FilterType::Triangle)
        } else {
            page.clone()
        };

        let input_gray = luma_of(&source);
        let input_skew = deskew::estimate_skew(&input_gray);
        let contrast_before = quality::rms_contrast(&input_gray);
        let quality_before = quality::quality_score(&input_gray, input_skew.angle);

        let mut steps = StepRecorder {
            enabled: options.return_steps,
            steps: Vec::new(),
        };

        let mut work = if options.grayscale {
            Working::Gray(input_gray)
        } else {
            Working::Color(source.to_rgb8())
        };
        if options.grayscale {
            steps.record("grayscale", &work);
        }

        if options.denoise {
            work = match work {
                Working::Gray(g) if fast => Working::Gray(denoise::median_gray(&g)),
                Working::Gray(g) => Working::Gray(denoise::non_local_means(&g)),
                Working::Color(c) => Working::Color(denoise::median_rgb(&c)),
            };
            steps.record("denoise", &work);
        }

        if options.contrast != 0 || options.brightness != 0 {
            let lut = adjust::level_table(options.brightness, options.contrast);
            match &mut work {
                Working::Gray(g) => adjust::apply_table_gray(g, &lut),
                Working::Color(c) => adjust::apply_table_rgb(c, &lut),
            }
            steps.record("contrast", &work);
        }

        let mut skew_corrected = false;
        if options.deskew && !fast {
            let estimate = deskew::estimate_skew(&work.luma());
            if estimate.needs_correction() {
                debug!("Straightening page by {:.2} degrees", estimate.angle);
                work = match work {
                    Working::Gray(g) => Working::Gray(deskew::straighten_gray(&g, estimate.angle)),
                    Working::Color(c) => Working::Color(deskew::straighten_rgb(&c, estimate.angle)),
                };
                skew_corrected = true;
                steps.record("deskew", &work);
            }
        }

        let mut threshold_level = None;
        if let Some(fixed) = options.threshold_mode() {
            let gray = work.into_luma();
            let level = fixed.unwrap_or_else(|| otsu_threshold(&histogram(&gray)));
            work = Working::Gray(binarize(&gray, level));
            threshold_level = Some(level);
            steps.record("threshold", &work);
        }

        if options.remove_borders && !fast {
            work = match work {
                Working::Gray(g) => Working::Gray(clean_speckles(&g)),
                color => {
                    debug!("Speckle cleanup skipped for color page");
                    color
                }
            };
            steps.record("cleanup", &work);
        }

        let mut image = work.into_dynamic();
        if image.dimensions() != (width, height) {
            let filter = if threshold_level.is_some() {
                FilterType::Nearest
            } else {
                FilterType::Triangle
            };
            image = image.resize_exact(width, height, filter);
        }

        let output_gray = luma_of(&image);
        let residual = deskew::estimate_skew(&output_gray);
        let contrast_after = quality::rms_contrast(&output_gray);
        let metrics = QualityMetrics {
            skew_angle: input_skew.angle,
            skew_corrected,
            residual_skew: residual.angle,
            contrast_before,
            contrast_after,
            contrast_delta: contrast_after - contrast_before,
            quality_before,
            quality_score: quality::quality_score(&output_gray, residual.angle),
            threshold_level,
        };

        let table = if options.detect_table {
            self.detector.detect(&output_gray)
        } else {
            None
        };

        debug!(
            "Preprocessed {}x{} page: quality {:.1} -> {:.1}, skew {:.2} -> {:.2}, {} table cells",
            width,
            height,
            metrics.quality_before,
            metrics.quality_score,
            metrics.skew_angle,
            metrics.residual_skew,
            table.as_ref().map_or(0, TableStructure::len)
        );

        Ok(PreprocessOutput {
            image,
            steps: steps.steps,
            metrics,
            table,
        })
    }
}
