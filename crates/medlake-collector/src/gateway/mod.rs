//! HTTP client for the channel gateway that fronts the messaging API.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `GET channels/{name}`: `{ "id": 1, "title": "..." }`
//! - `GET channels/{name}/messages?limit=N[&offset_id=M]`:
//!   `{ "messages": [...], "next_offset_id": M | null }`, newest first
//! - `GET channels/{name}/messages/{id}/photo`: raw image bytes

mod pages;

use std::time::Duration;

use async_trait::async_trait;
use medlake_core::ChannelName;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;

use crate::error::SourceError;
use crate::source::{ChannelEntity, ChannelSource, MessageStream};

pub use pages::MAX_PAGES;

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: i64,
    title: String,
}

/// One page of the messages endpoint. Elements stay raw so that a single
/// malformed message does not fail the whole page.
#[derive(Debug, Deserialize)]
pub(crate) struct MessagesPage {
    pub(crate) messages: Vec<serde_json::Value>,
    #[serde(default)]
    pub(crate) next_offset_id: Option<i64>,
}

/// [`ChannelSource`] backed by the HTTP channel gateway.
///
/// 429 responses surface as [`SourceError::RateLimited`] without retrying;
/// the collector decides what to do with the channel.
pub struct GatewayClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl GatewayClient {
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidBaseUrl`] if `base_url` cannot be parsed
    /// or cannot carry a path, and [`SourceError::Http`] if the underlying
    /// `reqwest::Client` cannot be constructed.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout_secs: u64,
        user_agent: &str,
    ) -> Result<Self, SourceError> {
        let parsed = Url::parse(base_url).map_err(|e| SourceError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(SourceError::InvalidBaseUrl {
                url: base_url.to_owned(),
                reason: "URL cannot be used as a base".to_owned(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: parsed,
            token: token.map(str::to_owned),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SourceError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot be used as a base".to_owned(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a GET and maps the status codes shared by every endpoint.
    /// `404` becomes `not_found`; the caller decides what that means.
    async fn get(
        &self,
        url: Url,
        channel: &ChannelName,
        not_found: impl FnOnce(String) -> SourceError,
    ) -> Result<Response, SourceError> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(SourceError::RateLimited {
                channel: channel.to_string(),
                retry_after_secs,
            });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(not_found(url.to_string()));
        }

        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }

    /// Fetches one page of messages, newest first, starting strictly before
    /// `offset_id` when given.
    ///
    /// # Errors
    ///
    /// - [`SourceError::RateLimited`]: HTTP 429.
    /// - [`SourceError::ChannelNotFound`]: HTTP 404.
    /// - [`SourceError::UnexpectedStatus`]: any other non-2xx status.
    /// - [`SourceError::Http`]: network or TLS failure.
    /// - [`SourceError::Deserialize`]: the page envelope is not valid JSON.
    pub(crate) async fn fetch_messages_page(
        &self,
        entity: &ChannelEntity,
        page_size: usize,
        offset_id: Option<i64>,
    ) -> Result<MessagesPage, SourceError> {
        let mut url = self.endpoint(&["channels", entity.name.as_str(), "messages"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &page_size.to_string());
            if let Some(offset_id) = offset_id {
                query.append_pair("offset_id", &offset_id.to_string());
            }
        }

        let channel = entity.name.to_string();
        let response = self
            .get(url, &entity.name, |_| SourceError::ChannelNotFound {
                channel: channel.clone(),
            })
            .await?;

        let body = response.text().await?;
        serde_json::from_str::<MessagesPage>(&body).map_err(|e| SourceError::Deserialize {
            context: format!("messages page for {}", entity.name),
            source: e,
        })
    }
}

#[async_trait]
impl ChannelSource for GatewayClient {
    async fn resolve(&self, channel: &ChannelName) -> Result<ChannelEntity, SourceError> {
        let url = self.endpoint(&["channels", channel.as_str()])?;
        let response = self
            .get(url, channel, |_| SourceError::ChannelNotFound {
                channel: channel.to_string(),
            })
            .await?;

        let body = response.text().await?;
        let parsed = serde_json::from_str::<ChannelResponse>(&body).map_err(|e| {
            SourceError::Deserialize {
                context: format!("channel {channel}"),
                source: e,
            }
        })?;

        Ok(ChannelEntity {
            id: parsed.id,
            name: channel.clone(),
            title: parsed.title,
        })
    }

    fn messages<'a>(&'a self, entity: &'a ChannelEntity, limit: usize) -> MessageStream<'a> {
        pages::message_stream(self, entity, limit)
    }

    async fn download_photo(
        &self,
        entity: &ChannelEntity,
        message_id: i64,
    ) -> Result<Vec<u8>, SourceError> {
        let id = message_id.to_string();
        let url = self.endpoint(&["channels", entity.name.as_str(), "messages", &id, "photo"])?;
        let response = self
            .get(url, &entity.name, |url| SourceError::UnexpectedStatus {
                status: StatusCode::NOT_FOUND.as_u16(),
                url,
            })
            .await?;

        Ok(response.bytes().await?.to_vec())
    }
}
