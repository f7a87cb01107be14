//! Per-channel collection loop.
//!
//! Channels are visited sequentially in configuration order. A failure while
//! processing a message skips that message; a rate-limit or stream failure
//! abandons the channel and discards its buffer; nothing a single channel
//! does stops the others.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use medlake_core::{ChannelMessage, ChannelName};
use medlake_lake::Lake;
use tokio::time::timeout;

use crate::buffer::DateBuffer;
use crate::error::SourceError;
use crate::source::{ChannelEntity, ChannelSource, SourceMessage};

#[derive(Debug, Clone, Copy)]
pub struct CollectorSettings {
    /// Default number of most-recent messages requested per channel.
    pub message_limit: usize,
    /// Deadline applied to every individual source call.
    pub call_timeout: Duration,
}

/// One channel to collect, with an optional per-channel limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub name: ChannelName,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoStatus {
    NoPhoto,
    Downloaded,
    /// The image already existed in the lake and was not fetched again.
    Reused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingDate,
    Malformed(String),
    PhotoDownload(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDate => f.write_str("message has no timestamp"),
            Self::Malformed(reason) => write!(f, "malformed message: {reason}"),
            Self::PhotoDownload(reason) => write!(f, "photo download failed: {reason}"),
        }
    }
}

/// What happened to a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Buffered {
        record: Box<ChannelMessage>,
        photo: PhotoStatus,
    },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    RateLimited { retry_after_secs: u64 },
    Unresolved(String),
    Source(String),
    TimedOut(&'static str),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { retry_after_secs } => {
                write!(f, "rate limited (retry after {retry_after_secs}s)")
            }
            Self::Unresolved(reason) => write!(f, "could not resolve channel: {reason}"),
            Self::Source(reason) => write!(f, "message stream failed: {reason}"),
            Self::TimedOut(operation) => write!(f, "{operation} timed out"),
        }
    }
}

impl From<SourceError> for AbortReason {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::RateLimited {
                retry_after_secs, ..
            } => Self::RateLimited { retry_after_secs },
            other => Self::Source(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Completed,
    Aborted(AbortReason),
}

/// Per-channel tallies reported after collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel: ChannelName,
    pub status: ChannelStatus,
    pub messages_buffered: usize,
    pub messages_skipped: usize,
    pub images_downloaded: usize,
    pub images_reused: usize,
    pub partitions: Vec<PathBuf>,
    pub partitions_failed: usize,
}

impl ChannelOutcome {
    fn new(channel: ChannelName) -> Self {
        Self {
            channel,
            status: ChannelStatus::Completed,
            messages_buffered: 0,
            messages_skipped: 0,
            images_downloaded: 0,
            images_reused: 0,
            partitions: Vec::new(),
            partitions_failed: 0,
        }
    }

    fn aborted(mut self, reason: AbortReason) -> Self {
        match &reason {
            AbortReason::RateLimited { retry_after_secs } => tracing::warn!(
                channel = %self.channel,
                retry_after_secs,
                "rate limited; abandoning channel for this run"
            ),
            other => tracing::error!(
                channel = %self.channel,
                reason = %other,
                "channel collection aborted"
            ),
        }
        self.status = ChannelStatus::Aborted(reason);
        self
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == ChannelStatus::Completed
    }
}

#[derive(Debug, Default)]
pub struct CollectReport {
    pub channels: Vec<ChannelOutcome>,
}

impl CollectReport {
    /// `true` when there was at least one channel and none of them completed.
    #[must_use]
    pub fn all_aborted(&self) -> bool {
        !self.channels.is_empty() && self.channels.iter().all(|c| !c.is_completed())
    }

    #[must_use]
    pub fn partitions_written(&self) -> usize {
        self.channels.iter().map(|c| c.partitions.len()).sum()
    }

    #[must_use]
    pub fn messages_buffered(&self) -> usize {
        self.channels.iter().map(|c| c.messages_buffered).sum()
    }
}

pub struct Collector<'a, S: ChannelSource + ?Sized> {
    source: &'a S,
    lake: &'a Lake,
    settings: CollectorSettings,
}

impl<'a, S: ChannelSource + ?Sized> Collector<'a, S> {
    pub fn new(source: &'a S, lake: &'a Lake, settings: CollectorSettings) -> Self {
        Self {
            source,
            lake,
            settings,
        }
    }

    /// Collect every target in order. Never fails as a whole; per-channel
    /// results are in the report.
    pub async fn run(&self, targets: &[ChannelTarget]) -> CollectReport {
        let mut report = CollectReport::default();
        for target in targets {
            let outcome = self.collect_channel(target).await;
            tracing::info!(
                channel = %outcome.channel,
                completed = outcome.is_completed(),
                buffered = outcome.messages_buffered,
                skipped = outcome.messages_skipped,
                images_downloaded = outcome.images_downloaded,
                images_reused = outcome.images_reused,
                partitions = outcome.partitions.len(),
                "channel collection finished"
            );
            report.channels.push(outcome);
        }
        report
    }

    /// Collect one channel: resolve, stream, buffer by date, then flush one
    /// partition per date. An aborted channel writes nothing.
    pub async fn collect_channel(&self, target: &ChannelTarget) -> ChannelOutcome {
        let outcome = ChannelOutcome::new(target.name.clone());
        let deadline = self.settings.call_timeout;

        let entity = match timeout(deadline, self.source.resolve(&target.name)).await {
            Ok(Ok(entity)) => entity,
            Ok(Err(SourceError::RateLimited {
                retry_after_secs, ..
            })) => return outcome.aborted(AbortReason::RateLimited { retry_after_secs }),
            Ok(Err(e)) => return outcome.aborted(AbortReason::Unresolved(e.to_string())),
            Err(_) => return outcome.aborted(AbortReason::TimedOut("channel resolution")),
        };

        let limit = target.limit.unwrap_or(self.settings.message_limit);
        match self.stream_into_buffer(&entity, limit, outcome).await {
            Ok((outcome, buffer)) => self.flush(buffer, outcome),
            Err(outcome) => outcome,
        }
    }

    async fn stream_into_buffer(
        &self,
        entity: &ChannelEntity,
        limit: usize,
        mut outcome: ChannelOutcome,
    ) -> Result<(ChannelOutcome, DateBuffer), ChannelOutcome> {
        let deadline = self.settings.call_timeout;
        let mut buffer = DateBuffer::default();
        let mut stream = self.source.messages(entity, limit);

        loop {
            let Ok(next) = timeout(deadline, stream.next()).await else {
                return Err(outcome.aborted(AbortReason::TimedOut("message stream")));
            };
            let Some(item) = next else { break };

            let result = match item {
                Ok(message) => self.process_message(entity, message).await,
                Err(e) if e.is_item_level() => Ok(MessageOutcome::Skipped(SkipReason::Malformed(
                    e.to_string(),
                ))),
                Err(e) => Err(e),
            };

            match result {
                Ok(MessageOutcome::Buffered { record, photo }) => {
                    match photo {
                        PhotoStatus::Downloaded => outcome.images_downloaded += 1,
                        PhotoStatus::Reused => outcome.images_reused += 1,
                        PhotoStatus::NoPhoto => {}
                    }
                    outcome.messages_buffered += 1;
                    buffer.push(*record);
                }
                Ok(MessageOutcome::Skipped(reason)) => {
                    tracing::warn!(
                        channel = %entity.name,
                        reason = %reason,
                        "skipping message"
                    );
                    outcome.messages_skipped += 1;
                }
                Err(e) => return Err(outcome.aborted(AbortReason::from(e))),
            }
        }

        Ok((outcome, buffer))
    }

    /// Normalize one message, fetching its photo when needed.
    ///
    /// Returns `Err` only for failures that must abandon the whole channel.
    async fn process_message(
        &self,
        entity: &ChannelEntity,
        message: SourceMessage,
    ) -> Result<MessageOutcome, SourceError> {
        let Some(message_date) = message.date else {
            return Ok(MessageOutcome::Skipped(SkipReason::MissingDate));
        };

        let (image_path, photo) = if message.has_photo {
            match self.fetch_photo(entity, message.id).await? {
                Ok(found) => found,
                Err(reason) => return Ok(MessageOutcome::Skipped(reason)),
            }
        } else {
            (None, PhotoStatus::NoPhoto)
        };

        let record = ChannelMessage {
            message_id: message.id,
            channel_name: entity.name.to_string(),
            channel_title: entity.title.clone(),
            message_date,
            message_text: message.text,
            has_media: message.has_media || message.has_photo,
            image_path: image_path.map(|p| p.to_string_lossy().into_owned()),
            views: message.views.unwrap_or(0),
            forwards: message.forwards.unwrap_or(0),
            scraped_at: Utc::now(),
        };

        Ok(MessageOutcome::Buffered {
            record: Box::new(record),
            photo,
        })
    }

    /// Outer `Err` abandons the channel; inner `Err` skips the message.
    async fn fetch_photo(
        &self,
        entity: &ChannelEntity,
        message_id: i64,
    ) -> Result<Result<(Option<PathBuf>, PhotoStatus), SkipReason>, SourceError> {
        if self.lake.has_image(&entity.name, message_id) {
            let path = self.lake.image_path(&entity.name, message_id);
            return Ok(Ok((Some(path), PhotoStatus::Reused)));
        }

        let download = timeout(
            self.settings.call_timeout,
            self.source.download_photo(entity, message_id),
        )
        .await;

        let bytes = match download {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e @ SourceError::RateLimited { .. })) => return Err(e),
            Ok(Err(e)) => return Ok(Err(SkipReason::PhotoDownload(e.to_string()))),
            Err(_) => {
                return Ok(Err(SkipReason::PhotoDownload(
                    "download timed out".to_owned(),
                )))
            }
        };

        Ok(self
            .lake
            .store_image(&entity.name, message_id, &bytes)
            .map(|stored| (Some(stored), PhotoStatus::Downloaded))
            .map_err(|e| SkipReason::PhotoDownload(e.to_string())))
    }

    fn flush(&self, buffer: DateBuffer, mut outcome: ChannelOutcome) -> ChannelOutcome {
        for (date, records) in buffer.into_partitions() {
            match self.lake.write_partition(date, &outcome.channel, &records) {
                Ok(path) => outcome.partitions.push(path),
                Err(e) => {
                    tracing::error!(
                        channel = %outcome.channel,
                        %date,
                        error = %e,
                        "failed to write partition"
                    );
                    outcome.partitions_failed += 1;
                }
            }
        }
        outcome
    }
}
