use std::collections::VecDeque;

use futures::stream::{self, StreamExt};
use medlake_core::ChannelName;

use super::GatewayClient;
use crate::error::SourceError;
use crate::source::{ChannelEntity, MessageStream, SourceMessage};

/// Maximum number of pages requested per channel before the stream gives up.
/// Guards against a gateway that keeps returning the same cursor.
pub const MAX_PAGES: usize = 200;

/// Upper bound on the `limit` query parameter of a single page request.
pub(crate) const MAX_PAGE_SIZE: usize = 100;

struct Cursor {
    buffer: VecDeque<Result<SourceMessage, SourceError>>,
    offset_id: Option<i64>,
    remaining: usize,
    pages: usize,
    exhausted: bool,
}

/// Lazily pages through a channel's history, yielding at most `limit` items.
///
/// Pages are only requested once the previous page has been consumed. A
/// page-level error is yielded once and ends the stream.
pub(super) fn message_stream<'a>(
    client: &'a GatewayClient,
    entity: &'a ChannelEntity,
    limit: usize,
) -> MessageStream<'a> {
    let cursor = Cursor {
        buffer: VecDeque::new(),
        offset_id: None,
        remaining: limit,
        pages: 0,
        exhausted: false,
    };

    stream::unfold(cursor, move |mut cursor| async move {
        loop {
            if cursor.remaining == 0 {
                return None;
            }
            if let Some(item) = cursor.buffer.pop_front() {
                cursor.remaining -= 1;
                return Some((item, cursor));
            }
            if cursor.exhausted {
                return None;
            }
            if cursor.pages >= MAX_PAGES {
                cursor.exhausted = true;
                let err = SourceError::PaginationLimit {
                    channel: entity.name.to_string(),
                    max_pages: MAX_PAGES,
                };
                return Some((Err(err), cursor));
            }

            cursor.pages += 1;
            let page_size = cursor.remaining.min(MAX_PAGE_SIZE);
            match client
                .fetch_messages_page(entity, page_size, cursor.offset_id)
                .await
            {
                Ok(page) => {
                    cursor.exhausted = page.next_offset_id.is_none() || page.messages.is_empty();
                    cursor.offset_id = page.next_offset_id;
                    cursor.buffer.extend(
                        page.messages
                            .into_iter()
                            .map(|raw| decode_message(&entity.name, raw)),
                    );
                }
                Err(e) => {
                    cursor.exhausted = true;
                    return Some((Err(e), cursor));
                }
            }
        }
    })
    .boxed()
}

fn decode_message(
    channel: &ChannelName,
    raw: serde_json::Value,
) -> Result<SourceMessage, SourceError> {
    serde_json::from_value(raw).map_err(|e| SourceError::MalformedMessage {
        channel: channel.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_message_accepts_missing_optional_fields() {
        let channel = ChannelName::parse("demo").unwrap();
        let msg = decode_message(&channel, json!({ "id": 7 })).unwrap();
        assert_eq!(msg.id, 7);
        assert!(msg.date.is_none());
        assert!(!msg.has_photo);
        assert!(msg.views.is_none());
    }

    #[test]
    fn decode_message_reports_malformed_item() {
        let channel = ChannelName::parse("demo").unwrap();
        let err = decode_message(&channel, json!({ "id": "seven" })).unwrap_err();
        assert!(err.is_item_level());
        assert!(err.to_string().contains("demo"));
    }
}
