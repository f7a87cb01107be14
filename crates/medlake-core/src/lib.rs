pub mod app_config;
pub mod channels;
pub mod config;
pub mod detections;
pub mod messages;

pub use app_config::{AppConfig, Environment};
pub use channels::{load_channels, ChannelConfig, ChannelsFile};
pub use config::{load_app_config, load_app_config_from_env};
pub use detections::{Detection, ImageCategory, ImageDetection, PERSON_LABEL, PRODUCT_LABELS};
pub use messages::{ChannelMessage, ChannelName};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read channels file {path}: {source}")]
    ChannelsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse channels file: {0}")]
    ChannelsFileParse(#[source] serde_yaml::Error),

    #[error("channel configuration invalid: {0}")]
    Validation(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid channel name \"{name}\": {reason}")]
    InvalidChannelName { name: String, reason: &'static str },
}
