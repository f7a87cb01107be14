//! Channel names and the normalized message record written to the lake.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

const MAX_CHANNEL_NAME_LEN: usize = 64;

/// A validated public channel name.
///
/// One leading `@` is stripped; what remains must be 1-64 ASCII letters,
/// digits or underscores. The normalized form is used verbatim as a path
/// component in the lake, so two distinct names never share a partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    /// Parse and normalize a configured channel identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidChannelName`] if the name is empty, too
    /// long, or contains characters outside `[A-Za-z0-9_]`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        let name = trimmed.strip_prefix('@').unwrap_or(trimmed);

        let invalid = |reason| CoreError::InvalidChannelName {
            name: raw.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if name.len() > MAX_CHANNEL_NAME_LEN {
            return Err(invalid("name is longer than 64 characters"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid("only ASCII letters, digits and '_' are allowed"));
        }

        Ok(Self(name.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One collected channel message, as stored in a lake partition and loaded
/// into `raw.telegram_messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub message_id: i64,
    pub channel_name: String,
    pub channel_title: String,
    pub message_date: DateTime<Utc>,
    pub message_text: Option<String>,
    pub has_media: bool,
    pub image_path: Option<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub forwards: u64,
    /// When the collector observed the message, not when it was posted.
    pub scraped_at: DateTime<Utc>,
}

impl ChannelMessage {
    /// The calendar date (UTC) of the message's origin timestamp; selects its
    /// lake partition.
    #[must_use]
    pub fn partition_date(&self) -> NaiveDate {
        self.message_date.date_naive()
    }
}
