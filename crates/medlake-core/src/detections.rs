//! Object-detection results and the image category rule.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Detector label for a human.
pub const PERSON_LABEL: &str = "person";

/// Detector labels treated as product containers.
pub const PRODUCT_LABELS: [&str; 4] = ["bottle", "cup", "bowl", "wine glass"];

/// Content category derived from the set of detected labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    /// A person together with a product container.
    Promotional,
    /// A product container without a person.
    ProductDisplay,
    /// A person without a product container.
    Lifestyle,
    Other,
}

impl ImageCategory {
    /// Categorize an image from its detected labels.
    ///
    /// Rules are checked in order and the first match wins:
    /// person + product → promotional, product → product display,
    /// person → lifestyle, anything else → other. Label order and
    /// repetition do not matter.
    #[must_use]
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut has_person = false;
        let mut has_product = false;
        for label in labels {
            let label = label.as_ref();
            has_person |= label == PERSON_LABEL;
            has_product |= PRODUCT_LABELS.contains(&label);
        }

        match (has_person, has_product) {
            (true, true) => Self::Promotional,
            (false, true) => Self::ProductDisplay,
            (true, false) => Self::Lifestyle,
            (false, false) => Self::Other,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Promotional => "promotional",
            Self::ProductDisplay => "product_display",
            Self::Lifestyle => "lifestyle",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One box reported by the detection model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Enrichment row for one lake image, loaded into `raw.image_detections`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDetection {
    pub message_id: i64,
    pub channel_name: String,
    pub image_path: String,
    pub detected_objects: BTreeSet<String>,
    /// Mean confidence over every detection; `0.0` when nothing was detected.
    pub avg_confidence: f64,
    pub image_category: ImageCategory,
}

impl ImageDetection {
    #[must_use]
    pub fn from_detections(
        message_id: i64,
        channel_name: impl Into<String>,
        image_path: impl Into<String>,
        detections: &[Detection],
    ) -> Self {
        let detected_objects: BTreeSet<String> =
            detections.iter().map(|d| d.label.clone()).collect();

        let avg_confidence = if detections.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let denom = detections.len() as f64;
            detections.iter().map(|d| d.confidence).sum::<f64>() / denom
        };

        let image_category = ImageCategory::from_labels(&detected_objects);

        Self {
            message_id,
            channel_name: channel_name.into(),
            image_path: image_path.into(),
            detected_objects,
            avg_confidence,
            image_category,
        }
    }

    /// Labels joined with `,` in sorted order, the warehouse storage form.
    #[must_use]
    pub fn detected_objects_csv(&self) -> String {
        self.detected_objects
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}
