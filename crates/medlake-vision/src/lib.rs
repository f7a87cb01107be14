//! Image enrichment: object detection over lake images and the derived
//! content category per image.

pub mod classify;
pub mod detector;
pub mod error;

pub use classify::{classify_image, classify_lake_images, ClassificationReport, ImageOutcome};
pub use detector::{HttpDetector, ObjectDetector};
pub use error::VisionError;
