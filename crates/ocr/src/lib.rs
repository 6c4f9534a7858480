//! Bounded OCR dispatch for the digitization pipeline
//!
//! Recognition engines are owned by an [`OcrDispatchPool`] of fixed size.
//! Callers submit page or cell images and receive an [`OcrHandle`] that
//! resolves once a worker has recognized the image. Jobs beyond the
//! number of idle workers wait in a FIFO queue and are dispatched as soon
//! as a worker frees up.
//!
//! Engines are pluggable through [`RecognitionEngine`]: a remote HTTP
//! service ([`remote::RemoteEngine`]) or, with the `tesseract` feature, a
//! local Tesseract 5.x instance.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use landrec_ocr::remote::{RemoteConfig, RemoteEngineFactory};
//! use landrec_ocr::{OcrDispatchPool, OcrRequest, RecognitionMode};
//!
//! # async fn run() -> Result<(), landrec_ocr::OcrError> {
//! let factory = RemoteEngineFactory::new(RemoteConfig::default());
//! let pool = OcrDispatchPool::start(&factory, 4).await?;
//!
//! let page = Arc::new(image::open("deed.png").expect("image"));
//! let handle = pool.submit(OcrRequest::new("deed.png", page, RecognitionMode::Dense))?;
//! let recognition = handle.await?;
//! println!("{} ({:.1}%)", recognition.text, recognition.confidence);
//!
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod pool;
pub mod remote;

#[cfg(feature = "tesseract")]
pub mod tesseract;

use landrec_common::ProcessingError;
use thiserror::Error;

pub use engine::{EngineFactory, Recognition, RecognitionEngine, RecognitionMode};
pub use pool::{OcrDispatchPool, OcrHandle, OcrRequest, PoolStats, Ticket, DEFAULT_POOL_SIZE};

/// Errors that can occur during OCR processing
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Failed to initialize recognition engine: {0}")]
    InitError(String),

    #[error("Failed to run OCR: {0}")]
    RecognitionError(String),

    #[error("Invalid image dimensions: {0}")]
    InvalidImageDimensions(String),

    #[error("Recognition engine panicked: {0}")]
    EnginePanicked(String),

    #[error("Job cancelled before dispatch")]
    Cancelled,

    #[error("Recognition pool is shut down")]
    PoolClosed,

    #[error("No recognition worker could be started: {0}")]
    PoolUnavailable(String),
}

impl From<OcrError> for ProcessingError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::PoolUnavailable(msg) => ProcessingError::PoolUnavailable(msg),
            other => ProcessingError::Recognition(other.to_string()),
        }
    }
}
