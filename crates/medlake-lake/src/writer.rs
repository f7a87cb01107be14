//! Partition and image writes.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use medlake_core::{ChannelMessage, ChannelName};

use crate::{Lake, LakeError};

impl Lake {
    /// Write the full record list for one `(date, channel)` partition.
    ///
    /// Any previous content at the partition path is replaced, never merged.
    /// Records are written in the order given, as pretty-printed JSON with
    /// non-ASCII text kept verbatim. Returns the partition path.
    ///
    /// # Errors
    ///
    /// Returns [`LakeError::EmptyPartition`] for an empty slice,
    /// [`LakeError::Serialize`] if a record cannot be encoded, and
    /// [`LakeError::Io`] if the directory or file cannot be written.
    pub fn write_partition(
        &self,
        date: NaiveDate,
        channel: &ChannelName,
        records: &[ChannelMessage],
    ) -> Result<PathBuf, LakeError> {
        let path = self.partition_path(date, channel);
        if records.is_empty() {
            return Err(LakeError::EmptyPartition { path });
        }

        let mut body =
            serde_json::to_vec_pretty(records).map_err(|source| LakeError::Serialize {
                path: path.clone(),
                source,
            })?;
        body.push(b'\n');

        replace_file(&path, &body)?;
        tracing::info!(
            path = %path.display(),
            records = records.len(),
            "lake: partition written"
        );
        Ok(path)
    }

    /// Store the photo for `message_id`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`LakeError::Io`] if the file cannot be written.
    pub fn store_image(
        &self,
        channel: &ChannelName,
        message_id: i64,
        bytes: &[u8],
    ) -> Result<PathBuf, LakeError> {
        let path = self.image_path(channel, message_id);
        replace_file(&path, bytes)?;
        Ok(path)
    }
}

/// Write `bytes` to a temp file beside `path` and rename it into place, so a
/// concurrent reader sees either the old file or the new one.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), LakeError> {
    let parent = path
        .parent()
        .ok_or_else(|| LakeError::io(path, std::io::ErrorKind::InvalidInput.into()))?;
    std::fs::create_dir_all(parent).map_err(|e| LakeError::io(parent, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".medlake-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| LakeError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| LakeError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| LakeError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| LakeError::io(path, e.error))?;
    Ok(())
}
