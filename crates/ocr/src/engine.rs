//! Recognition engine seam owned by the dispatch pool.

use crate::OcrError;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Engine configuration selected per job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionMode {
    /// Automatic page segmentation, suited to printed forms
    #[default]
    Dense,
    /// Treat the image as one uniform block, used for handwriting and cells
    UniformBlock,
}

impl RecognitionMode {
    #[must_use]
    pub fn for_handwritten(handwritten: bool) -> Self {
        if handwritten {
            RecognitionMode::UniformBlock
        } else {
            RecognitionMode::Dense
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecognitionMode::Dense => "dense",
            RecognitionMode::UniformBlock => "uniform-block",
        }
    }
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text recognized from one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    /// Mean confidence in [0, 100]
    pub confidence: f32,
}

impl Recognition {
    #[must_use]
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// One recognition engine instance.
///
/// The pool calls `initialize` once before the first job, `recognize` for
/// one job at a time and `terminate` on shutdown.
#[async_trait]
pub trait RecognitionEngine: Send {
    async fn initialize(&mut self) -> Result<(), OcrError>;

    async fn recognize(
        &mut self,
        image: Arc<DynamicImage>,
        mode: RecognitionMode,
    ) -> Result<Recognition, OcrError>;

    async fn terminate(&mut self) -> Result<(), OcrError> {
        Ok(())
    }
}

/// Creates the engine for each pool worker
pub trait EngineFactory: Send + Sync {
    fn create(&self, worker_id: usize) -> Box<dyn RecognitionEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn(usize) -> Box<dyn RecognitionEngine> + Send + Sync,
{
    fn create(&self, worker_id: usize) -> Box<dyn RecognitionEngine> {
        self(worker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selection() {
        assert_eq!(RecognitionMode::for_handwritten(true), RecognitionMode::UniformBlock);
        assert_eq!(RecognitionMode::for_handwritten(false), RecognitionMode::Dense);
        assert_eq!(
            serde_json::to_string(&RecognitionMode::UniformBlock).unwrap(),
            "\"uniform-block\""
        );
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(Recognition::new("a", 140.0).confidence, 100.0);
        assert_eq!(Recognition::new("a", -3.0).confidence, 0.0);
        assert_eq!(Recognition::new("a", f32::NAN).confidence, 0.0);
    }
}
