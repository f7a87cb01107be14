use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("channel not found: {channel}")]
    ChannelNotFound { channel: String },

    #[error("rate limited while reading {channel} (retry after {retry_after_secs}s)")]
    RateLimited {
        channel: String,
        retry_after_secs: u64,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed message in {channel}: {reason}")]
    MalformedMessage { channel: String, reason: String },

    #[error("pagination limit reached for {channel}: exceeded {max_pages} pages")]
    PaginationLimit { channel: String, max_pages: usize },

    #[error("invalid gateway URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl SourceError {
    /// `true` when only the current message is affected and the channel's
    /// stream can keep going.
    #[must_use]
    pub fn is_item_level(&self) -> bool {
        matches!(self, Self::MalformedMessage { .. })
    }
}
