//! The seam between the collector and the external channel API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use medlake_core::ChannelName;
use serde::Deserialize;

use crate::error::SourceError;

/// Lazy, finite, non-restartable sequence of messages, newest first.
pub type MessageStream<'a> = BoxStream<'a, Result<SourceMessage, SourceError>>;

/// A resolved channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntity {
    pub id: i64,
    pub name: ChannelName,
    pub title: String,
}

/// A message as reported by the channel API, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceMessage {
    pub id: i64,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub has_photo: bool,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub forwards: Option<u64>,
}

#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Resolve a channel name to a stable entity.
    ///
    /// Fails with [`SourceError::ChannelNotFound`] for unknown channels.
    async fn resolve(&self, channel: &ChannelName) -> Result<ChannelEntity, SourceError>;

    /// Up to `limit` of the channel's most recent messages, newest first.
    ///
    /// A [`SourceError::RateLimited`] item signals that the source wants the
    /// caller to back off; item-level errors (see
    /// [`SourceError::is_item_level`]) may be followed by more messages.
    fn messages<'a>(&'a self, entity: &'a ChannelEntity, limit: usize) -> MessageStream<'a>;

    /// Fetch the bytes of the photo attached to `message_id`.
    async fn download_photo(
        &self,
        entity: &ChannelEntity,
        message_id: i64,
    ) -> Result<Vec<u8>, SourceError>;
}
