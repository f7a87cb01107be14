//! Classify every image in the lake.

use std::time::Duration;

use medlake_core::ImageDetection;
use medlake_lake::{ImageRef, Lake};
use tokio::time::timeout;

use crate::detector::ObjectDetector;

/// Result of classifying one image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Classified(ImageDetection),
    Failed { image: ImageRef, reason: String },
}

#[derive(Debug, Default)]
pub struct ClassificationReport {
    pub detections: Vec<ImageDetection>,
    pub failures: Vec<(ImageRef, String)>,
}

impl ClassificationReport {
    #[must_use]
    pub fn images_seen(&self) -> usize {
        self.detections.len() + self.failures.len()
    }
}

/// Detect objects in one image and derive its category.
///
/// Inference errors and deadline expiry become [`ImageOutcome::Failed`].
pub async fn classify_image<D: ObjectDetector + ?Sized>(
    detector: &D,
    image: &ImageRef,
    deadline: Duration,
) -> ImageOutcome {
    let reason = match timeout(deadline, detector.detect(&image.path)).await {
        Ok(Ok(detections)) => {
            return ImageOutcome::Classified(ImageDetection::from_detections(
                image.message_id,
                image.channel.as_str(),
                image.path.to_string_lossy(),
                &detections,
            ));
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("inference timed out after {deadline:?}"),
    };
    ImageOutcome::Failed {
        image: image.clone(),
        reason,
    }
}

/// Classify every image under the lake's image directory, one at a time.
///
/// A failed image is logged and left out of `detections`; it never aborts
/// the run.
pub async fn classify_lake_images<D: ObjectDetector + ?Sized>(
    lake: &Lake,
    detector: &D,
    deadline: Duration,
) -> ClassificationReport {
    // Step 1: enumerate images
    let images = lake.list_images();
    tracing::info!(images = images.len(), "classifying lake images");

    // Step 2: detect and classify each image
    let mut report = ClassificationReport::default();
    for image in &images {
        match classify_image(detector, image, deadline).await {
            ImageOutcome::Classified(detection) => {
                tracing::debug!(
                    channel = %image.channel,
                    message_id = image.message_id,
                    category = %detection.image_category,
                    "image classified"
                );
                report.detections.push(detection);
            }
            ImageOutcome::Failed { image, reason } => {
                tracing::warn!(
                    channel = %image.channel,
                    message_id = image.message_id,
                    reason = %reason,
                    "skipping image"
                );
                report.failures.push((image, reason));
            }
        }
    }

    // Step 3: summarize
    tracing::info!(
        classified = report.detections.len(),
        failed = report.failures.len(),
        "image classification finished"
    );
    report
}
