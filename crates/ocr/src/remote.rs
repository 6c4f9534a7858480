//! Recognition delegated to an HTTP service.
//!
//! Protocol: `GET {endpoint}/health` must succeed during initialization;
//! `POST {endpoint}/recognize` takes `{"image": <base64 PNG>, "mode": ..}`
//! and answers `{"text": .., "confidence": ..}`.

use crate::engine::{EngineFactory, Recognition, RecognitionEngine, RecognitionMode};
use crate::OcrError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Connection settings for the recognition service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8866".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    image: String,
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    text: String,
    confidence: f32,
}

/// PNG-encode an image for transport
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(OcrError::InvalidImageDimensions(format!(
            "Image dimensions must be non-zero (got {}x{})",
            image.width(),
            image.height()
        )));
    }
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| OcrError::RecognitionError(format!("Failed to encode image to PNG: {}", e)))?;
    Ok(buf.into_inner())
}

/// Engine that forwards each job to the recognition service
pub struct RemoteEngine {
    config: RemoteConfig,
    client: Option<reqwest::Client>,
}

impl RemoteEngine {
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl RecognitionEngine for RemoteEngine {
    async fn initialize(&mut self) -> Result<(), OcrError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| OcrError::InitError(format!("Failed to build HTTP client: {}", e)))?;

        let health = self.url("health");
        let response = client
            .get(&health)
            .send()
            .await
            .map_err(|e| OcrError::InitError(format!("{} unreachable: {}", health, e)))?;
        if !response.status().is_success() {
            return Err(OcrError::InitError(format!(
                "{} answered {}",
                health,
                response.status()
            )));
        }

        debug!("Remote recognition service ready at {}", self.config.endpoint);
        self.client = Some(client);
        Ok(())
    }

    async fn recognize(
        &mut self,
        image: Arc<DynamicImage>,
        mode: RecognitionMode,
    ) -> Result<Recognition, OcrError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| OcrError::InitError("engine used before initialization".to_string()))?;

        let png = encode_png(&image)?;
        let body = RecognizeRequest {
            image: STANDARD.encode(png),
            mode: mode.as_str(),
        };

        let response = client
            .post(self.url("recognize"))
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| OcrError::RecognitionError(format!("Recognition request failed: {}", e)))?;
        let parsed: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| OcrError::RecognitionError(format!("Malformed recognition response: {}", e)))?;

        Ok(Recognition::new(parsed.text, parsed.confidence))
    }

    async fn terminate(&mut self) -> Result<(), OcrError> {
        self.client = None;
        Ok(())
    }
}

/// Creates one [`RemoteEngine`] per pool worker
#[derive(Debug, Clone, Default)]
pub struct RemoteEngineFactory {
    config: RemoteConfig,
}

impl RemoteEngineFactory {
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for RemoteEngineFactory {
    fn create(&self, _worker_id: usize) -> Box<dyn RecognitionEngine> {
        Box::new(RemoteEngine::new(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn test_encode_png_rejects_empty_image() {
        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        assert!(matches!(
            encode_png(&empty),
            Err(OcrError::InvalidImageDimensions(_))
        ));

        let page = DynamicImage::ImageLuma8(GrayImage::new(8, 8));
        let png = encode_png(&page).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_request_shape() {
        let body = RecognizeRequest {
            image: STANDARD.encode([1u8, 2, 3]),
            mode: RecognitionMode::UniformBlock.as_str(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["image"], "AQID");
        assert_eq!(json["mode"], "uniform-block");
    }

    #[test]
    fn test_url_joining() {
        let engine = RemoteEngine::new(RemoteConfig {
            endpoint: "http://ocr.local/api/".to_string(),
            timeout_secs: 5,
        });
        assert_eq!(engine.url("recognize"), "http://ocr.local/api/recognize");
    }

    #[tokio::test]
    async fn test_unreachable_service_fails_initialization() {
        let mut engine = RemoteEngine::new(RemoteConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
        });
        assert!(matches!(
            engine.initialize().await,
            Err(OcrError::InitError(_))
        ));

        let page = Arc::new(DynamicImage::ImageLuma8(GrayImage::new(4, 4)));
        assert!(matches!(
            engine.recognize(page, RecognitionMode::Dense).await,
            Err(OcrError::InitError(_))
        ));
    }
}
