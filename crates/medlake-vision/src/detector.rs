//! Object-detection seam and its HTTP inference-server implementation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use medlake_core::Detection;
use serde::Deserialize;

use crate::error::VisionError;

#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Run detection on the image at `image`, returning zero or more labelled
    /// detections with confidences in `[0, 1]`.
    async fn detect(&self, image: &Path) -> Result<Vec<Detection>, VisionError>;
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<RawDetection>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    label: String,
    confidence: f64,
}

/// Client for an inference server exposing `POST /detect`.
///
/// The request body is the raw image; the response is
/// `{"detections": [{"label": "bottle", "confidence": 0.87}]}`.
pub struct HttpDetector {
    client: reqwest::Client,
    url: String,
}

impl HttpDetector {
    /// # Errors
    ///
    /// Returns [`VisionError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, VisionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/detect", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ObjectDetector for HttpDetector {
    async fn detect(&self, image: &Path) -> Result<Vec<Detection>, VisionError> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|source| VisionError::Io {
                path: image.to_path_buf(),
                source,
            })?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VisionError::Detector(format!(
                "inference server returned status {}",
                response.status()
            )));
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Detector(format!("response parse error: {e}")))?;

        parsed
            .detections
            .into_iter()
            .map(|raw| {
                if raw.confidence.is_finite() && (0.0..=1.0).contains(&raw.confidence) {
                    Ok(Detection {
                        label: raw.label,
                        confidence: raw.confidence,
                    })
                } else {
                    Err(VisionError::InvalidConfidence {
                        label: raw.label,
                        confidence: raw.confidence,
                    })
                }
            })
            .collect()
    }
}
