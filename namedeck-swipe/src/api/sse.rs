//! Server-Sent Events stream of `NamedeckEvent`s

use crate::api::AppContext;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct EventFilter {
    /// Comma-separated event types; all events when absent
    types: Option<String>,
}

/// GET /events - SSE event stream
///
/// `?types=ChunkLoaded,DecisionRecorded` limits the stream to those event types.
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let wanted: Option<HashSet<String>> = filter.types.map(|types| {
        types
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    });
    info!(filter = ?wanted, "New SSE client connected");

    let mut rx = ctx.events.subscribe();

    let stream = async_stream::stream! {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE client lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let event_type = event.event_type();
            if let Some(wanted) = &wanted {
                if !wanted.contains(event_type) {
                    continue;
                }
            }

            match serde_json::to_string(&event) {
                Ok(json) => {
                    debug!("SSE: Broadcasting event: {}", event_type);
                    yield Ok(Event::default().event(event_type).data(json));
                }
                Err(e) => warn!("SSE: Failed to serialize event {}: {}", event_type, e),
            }
        }
        debug!("SSE: Event bus closed, ending stream");
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}
