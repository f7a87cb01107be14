//! Channel collection: reads recent messages from each configured channel,
//! downloads attached photos into the lake, and writes one partition per
//! `(date, channel)`.

pub mod buffer;
pub mod collector;
pub mod error;
pub mod gateway;
pub mod source;

pub use buffer::DateBuffer;
pub use collector::{
    AbortReason, ChannelOutcome, ChannelStatus, ChannelTarget, CollectReport, Collector,
    CollectorSettings, MessageOutcome, PhotoStatus, SkipReason,
};
pub use error::SourceError;
pub use gateway::GatewayClient;
pub use source::{ChannelEntity, ChannelSource, MessageStream, SourceMessage};
