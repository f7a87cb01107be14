//! Read-side enumeration of partitions and images.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use medlake_core::ChannelName;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::{Lake, LakeError, PARTITION_EXTENSION};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// All message records found in the lake, plus how many files contributed.
#[derive(Debug, Default)]
pub struct PartitionScan {
    pub records: Vec<Map<String, Value>>,
    pub files_read: usize,
    pub files_skipped: usize,
}

/// A stored image keyed by the message it was attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub channel: ChannelName,
    pub message_id: i64,
    pub path: PathBuf,
}

impl Lake {
    /// Every partition file under the messages directory, sorted by path.
    ///
    /// A missing directory yields an empty list.
    #[must_use]
    pub fn list_partitions(&self) -> Vec<PathBuf> {
        let dir = self.messages_dir();
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "lake: messages directory not found");
            return Vec::new();
        }

        WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    tracing::warn!(error = %e, "lake: skipping unreadable entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && has_extension(e.path(), &[PARTITION_EXTENSION]))
            .map(walkdir::DirEntry::into_path)
            .collect()
    }

    /// Parse one partition file into its list of record objects.
    ///
    /// A file holding a single top-level object counts as one record.
    /// Array elements that are not objects are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`LakeError::Io`] if the file cannot be read,
    /// [`LakeError::Parse`] if it is not valid JSON, and
    /// [`LakeError::UnexpectedShape`] for any other top-level value.
    pub fn read_partition(path: &Path) -> Result<Vec<Map<String, Value>>, LakeError> {
        let content = std::fs::read_to_string(path).map_err(|e| LakeError::io(path, e))?;
        let value: Value = serde_json::from_str(&content).map_err(|source| LakeError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        match value {
            Value::Array(items) => {
                let total = items.len();
                let records: Vec<Map<String, Value>> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(map),
                        _ => None,
                    })
                    .collect();
                if records.len() != total {
                    tracing::warn!(
                        path = %path.display(),
                        dropped = total - records.len(),
                        "lake: dropped non-object entries from partition"
                    );
                }
                Ok(records)
            }
            Value::Object(map) => Ok(vec![map]),
            _ => Err(LakeError::UnexpectedShape {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Read every partition and concatenate their records.
    ///
    /// Files that cannot be read or parsed are logged and counted in
    /// `files_skipped`; they never abort the scan.
    #[must_use]
    pub fn scan_messages(&self) -> PartitionScan {
        let mut scan = PartitionScan::default();

        for path in self.list_partitions() {
            match Self::read_partition(&path) {
                Ok(records) => {
                    scan.files_read += 1;
                    scan.records.extend(records);
                }
                Err(e) => {
                    tracing::error!(error = %e, "lake: skipping partition");
                    scan.files_skipped += 1;
                }
            }
        }

        tracing::info!(
            records = scan.records.len(),
            files_read = scan.files_read,
            files_skipped = scan.files_skipped,
            "lake: message scan complete"
        );
        scan
    }

    /// Every image stored as `images/{channel}/{message_id}.{jpg,jpeg,png}`,
    /// one per `(channel, message_id)`, sorted by that key.
    ///
    /// Files whose stem is not a message id, or whose directory is not a valid
    /// channel name, are skipped with a warning. When several files share a
    /// key, the canonical [`Lake::image_path`] wins; otherwise the first by
    /// file name. The shadowed files are logged.
    #[must_use]
    pub fn list_images(&self) -> Vec<ImageRef> {
        let dir = self.images_dir();
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "lake: images directory not found");
            return Vec::new();
        }

        WalkDir::new(&dir)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    tracing::warn!(error = %e, "lake: skipping unreadable entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && has_extension(e.path(), &IMAGE_EXTENSIONS))
            .filter_map(|e| image_ref(e.into_path()))
            .fold(BTreeMap::new(), |mut images, image| {
                let key = (image.channel.clone(), image.message_id);
                match images.entry(key) {
                    Entry::Vacant(slot) => {
                        slot.insert(image);
                    }
                    Entry::Occupied(mut slot) => {
                        let canonical = self.image_path(&image.channel, image.message_id);
                        let shadowed = if image.path == canonical {
                            slot.insert(image)
                        } else {
                            image
                        };
                        tracing::warn!(
                            shadowed = %shadowed.path.display(),
                            used = %slot.get().path.display(),
                            "lake: duplicate image for message; ignoring shadowed file"
                        );
                    }
                }
                images
            })
            .into_values()
            .collect()
    }
}

fn image_ref(path: PathBuf) -> Option<ImageRef> {
    let channel = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .and_then(|n| ChannelName::parse(n).ok());
    let message_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse::<i64>().ok());

    if let (Some(channel), Some(message_id)) = (channel, message_id) {
        Some(ImageRef {
            channel,
            message_id,
            path,
        })
    } else {
        tracing::warn!(path = %path.display(), "lake: image path does not encode (channel, message_id); skipping");
        None
    }
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}
