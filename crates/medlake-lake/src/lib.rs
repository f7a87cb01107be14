//! File-backed landing zone for collected channel content.
//!
//! Layout under the lake root:
//!
//! ```text
//! telegram_messages/{YYYY-MM-DD}/{channel}.json   one partition per (date, channel)
//! images/{channel}/{message_id}.jpg               downloaded photos
//! ```
//!
//! Partition and image paths are pure functions of their keys. Writes replace
//! the target atomically; readers skip anything they cannot parse.

pub mod error;
mod reader;
mod writer;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use medlake_core::ChannelName;

pub use error::LakeError;
pub use reader::{ImageRef, PartitionScan};

/// Directory under the lake root that holds message partitions.
pub const MESSAGES_DIR: &str = "telegram_messages";
/// Directory under the lake root that holds downloaded images.
pub const IMAGES_DIR: &str = "images";

const PARTITION_EXTENSION: &str = "json";
const IMAGE_EXTENSION: &str = "jpg";

#[derive(Debug, Clone)]
pub struct Lake {
    root: PathBuf,
}

impl Lake {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn messages_dir(&self) -> PathBuf {
        self.root.join(MESSAGES_DIR)
    }

    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    /// Path of the partition file for one `(date, channel)` pair.
    #[must_use]
    pub fn partition_path(&self, date: NaiveDate, channel: &ChannelName) -> PathBuf {
        self.messages_dir()
            .join(date.format("%Y-%m-%d").to_string())
            .join(format!("{channel}.{PARTITION_EXTENSION}"))
    }

    /// Path where the photo attached to `message_id` is stored.
    #[must_use]
    pub fn image_path(&self, channel: &ChannelName, message_id: i64) -> PathBuf {
        self.images_dir()
            .join(channel.as_str())
            .join(format!("{message_id}.{IMAGE_EXTENSION}"))
    }

    #[must_use]
    pub fn has_image(&self, channel: &ChannelName, message_id: i64) -> bool {
        self.image_path(channel, message_id).is_file()
    }
}
