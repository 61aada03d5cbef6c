//! SSE (Server-Sent Events) feed of cache events.
//!
//! Converts the coordinator's broadcast receiver into an SSE stream. Each
//! event is sent with its name as the SSE event type and its id as the SSE id.

use axum::response::sse::Event;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::events::CacheEvent;

/// Sent when a slow subscriber missed events.
#[derive(Debug, Serialize)]
pub struct LaggedNotice {
    pub skipped: u64,
}

/// Convert a cache event receiver into an SSE stream.
pub fn events_to_sse_stream(
    rx: broadcast::Receiver<CacheEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    BroadcastStream::new(rx).map(|item| {
        let event = match item {
            Ok(event) => Event::default()
                .event(event.name.clone())
                .id(event.id.clone())
                .data(serde_json::to_string(&event).unwrap_or_default()),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => Event::default()
                .event("lagged")
                .data(serde_json::to_string(&LaggedNotice { skipped }).unwrap_or_default()),
        };
        Ok(event)
    })
}
