use crate::state::AppState;
use axum::{
    extract::State,
    http::Uri,
    response::sse::{Event, KeepAlive, Sse},
};
use dismissible::events::ItemEvent;
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    user: Vec<String>,
    event_type: Vec<String>,
}

impl EventFilter {
    /// Parse query string with CSV support for multiple values
    /// Examples: ?user=u1,u2&type=dismissed,restored
    fn from_query_string(query: &str) -> Self {
        let mut user = Vec::new();
        let mut event_type = Vec::new();

        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                match key {
                    "user" => {
                        user.extend(value.split(',').map(|s| s.trim().to_string()));
                    }
                    "type" => {
                        event_type.extend(value.split(',').map(|s| s.trim().to_string()));
                    }
                    _ => {}
                }
            }
        }

        Self { user, event_type }
    }
}

/// SSE endpoint that streams item lifecycle events to clients
pub async fn stream_events(
    State(state): State<AppState>,
    uri: Uri,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let filter = uri
        .query()
        .map(EventFilter::from_query_string)
        .unwrap_or_default();

    tracing::info!(
        "New SSE client connected. Filters: user={:?}, type={:?}",
        filter.user,
        filter.event_type
    );

    let rx = state.event_channel.subscribe();
    let stream = BroadcastStream::new(rx);

    let filtered_stream = stream.filter_map(move |result| {
        let filter_clone = filter.clone();
        async move {
            match result {
                Ok(event) => {
                    let should_send_event = should_send(&event, &filter_clone);
                    tracing::debug!(
                        "Received event: type={}, user={}, item={}, should_send={}",
                        event.kind(),
                        event.user_id(),
                        event.item_id(),
                        should_send_event
                    );
                    if should_send_event {
                        Some(Ok(to_sse_event(&event)))
                    } else {
                        None
                    }
                }
                Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                    Some(Ok(Event::default()
                        .event("error")
                        .data(format!("Lagged by {} events", n))))
                }
            }
        }
    });

    Sse::new(filtered_stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Check if an event should be sent based on the filter criteria
fn should_send(event: &ItemEvent, filter: &EventFilter) -> bool {
    if !filter.user.is_empty() && !filter.user.iter().any(|u| u == event.user_id()) {
        return false;
    }

    if !filter.event_type.is_empty() && !filter.event_type.iter().any(|t| t == event.kind()) {
        return false;
    }

    true
}

/// Convert an ItemEvent to an SSE Event named `item.<kind>`
fn to_sse_event(event: &ItemEvent) -> Event {
    let name = format!("item.{}", event.kind());
    match Event::default().event(&name).json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            tracing::warn!("Failed to encode {} event: {}", name, e);
            Event::default().event("error").data(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use dismissible::domain::ItemFactory;
    use dismissible::events::{ItemCreatedEvent, ItemDismissedEvent};

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_067_200, 0).unwrap()
    }

    fn created(user_id: &str) -> ItemEvent {
        let item = ItemFactory::create("banner", user_id, t0(), None).unwrap();
        ItemEvent::Created(ItemCreatedEvent {
            user_id: user_id.to_string(),
            item_id: "banner".to_string(),
            item,
            context: None,
            timestamp: t0(),
        })
    }

    fn dismissed(user_id: &str) -> ItemEvent {
        let previous = ItemFactory::create("banner", user_id, t0(), None).unwrap();
        let item = ItemFactory::mark_dismissed(&previous, t0()).unwrap();
        ItemEvent::Dismissed(ItemDismissedEvent {
            user_id: user_id.to_string(),
            item_id: "banner".to_string(),
            item,
            previous_item: previous,
            context: None,
            timestamp: t0(),
        })
    }

    #[test]
    fn test_filter_parsing() {
        let filter = EventFilter::from_query_string("user=u1, u2&type=dismissed&other=x");
        assert_eq!(filter.user, vec!["u1", "u2"]);
        assert_eq!(filter.event_type, vec!["dismissed"]);
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let filter = EventFilter::default();
        assert!(should_send(&created("u1"), &filter));
        assert!(should_send(&dismissed("u2"), &filter));
    }

    #[test]
    fn test_filters_combine() {
        let filter = EventFilter::from_query_string("user=u1&type=dismissed");
        assert!(should_send(&dismissed("u1"), &filter));
        assert!(!should_send(&dismissed("u2"), &filter));
        assert!(!should_send(&created("u1"), &filter));
    }
}
