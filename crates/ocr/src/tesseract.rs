//! Local recognition with Tesseract 5.x through leptess

use crate::engine::{EngineFactory, Recognition, RecognitionEngine, RecognitionMode};
use crate::remote::encode_png;
use crate::OcrError;
use async_trait::async_trait;
use image::DynamicImage;
use leptess::{LepTess, Variable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Tesseract settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// Tesseract language codes (e.g., "tam+eng")
    pub language: String,
    /// Page segmentation mode for dense pages (PSM_AUTO)
    pub dense_psm: u32,
    /// Page segmentation mode for uniform blocks (PSM_SINGLE_BLOCK)
    pub block_psm: u32,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            language: "tam+eng".to_string(),
            dense_psm: 3,
            block_psm: 6,
        }
    }
}

impl TesseractConfig {
    fn psm(&self, mode: RecognitionMode) -> u32 {
        match mode {
            RecognitionMode::Dense => self.dense_psm,
            RecognitionMode::UniformBlock => self.block_psm,
        }
    }
}

fn open(language: &str) -> Result<LepTess, OcrError> {
    LepTess::new(None, language).map_err(|e| {
        OcrError::InitError(format!(
            "Failed to initialize Tesseract with language '{}': {}. \
             Make sure language data is installed (e.g., 'apt install tesseract-ocr-tam')",
            language, e
        ))
    })
}

/// One Tesseract instance per pool worker.
///
/// The handle is created inside the blocking task for each job, so the
/// engine itself only carries configuration.
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    #[must_use]
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    async fn initialize(&mut self) -> Result<(), OcrError> {
        let language = self.config.language.clone();
        tokio::task::spawn_blocking(move || open(&language).map(|_| ()))
            .await
            .map_err(|e| OcrError::InitError(format!("Initialization task failed: {}", e)))?
    }

    async fn recognize(
        &mut self,
        image: Arc<DynamicImage>,
        mode: RecognitionMode,
    ) -> Result<Recognition, OcrError> {
        let language = self.config.language.clone();
        let psm = self.config.psm(mode);

        tokio::task::spawn_blocking(move || {
            let png = encode_png(&image)?;
            let mut lt = open(&language)?;
            lt.set_variable(Variable::TesseditPagesegMode, &psm.to_string())
                .map_err(|e| OcrError::InitError(format!("Failed to set PSM: {}", e)))?;
            lt.set_image_from_mem(&png).map_err(|e| {
                OcrError::RecognitionError(format!("Failed to set image from memory: {}", e))
            })?;

            let text = lt
                .get_utf8_text()
                .map_err(|e| OcrError::RecognitionError(format!("Invalid UTF-8 output: {}", e)))?;
            let confidence = lt.mean_text_conf() as f32;
            debug!("Tesseract PSM {}: {} chars at {}%", psm, text.len(), confidence);
            Ok(Recognition::new(text, confidence))
        })
        .await
        .map_err(|e| OcrError::RecognitionError(format!("Recognition task failed: {}", e)))?
    }
}

/// Creates one [`TesseractEngine`] per pool worker
#[derive(Debug, Clone, Default)]
pub struct TesseractEngineFactory {
    config: TesseractConfig,
}

impl TesseractEngineFactory {
    #[must_use]
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for TesseractEngineFactory {
    fn create(&self, _worker_id: usize) -> Box<dyn RecognitionEngine> {
        Box::new(TesseractEngine::new(self.config.clone()))
    }
}
