use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cannot read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("detector error: {0}")]
    Detector(String),

    #[error("detector returned confidence {confidence} for \"{label}\", expected a value in [0, 1]")]
    InvalidConfidence { label: String, confidence: f64 },
}
