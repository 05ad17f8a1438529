//! Per-request activity feed.
//!
//! WebSocket observers subscribe on upgrade; after every request the
//! middleware publishes one JSON event to all of them. Broadcasting is
//! best-effort: a send that fails removes the subscriber and never fails
//! the originating request.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// One request seen by the engine, as pushed to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    pub method: String,
    /// Path including the query string, e.g. `/bucket/key?x=1`.
    pub path: String,
    pub status: u16,
    /// Handler wall time in milliseconds.
    pub duration: u64,
    /// ISO-8601 UTC, millisecond precision.
    pub timestamp: String,
}

/// Process-local set of WebSocket subscribers for one tenant.
#[derive(Default)]
pub struct ActivityBroadcaster {
    subscribers: Mutex<Vec<UnboundedSender<String>>>,
}

impl ActivityBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn subscribe(&self) -> UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Fan an event out to every subscriber, dropping the ones whose
    /// channel is gone.
    pub fn publish(&self, event: &ActivityEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(_) => return,
        };
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
    }

    /// Accept a WebSocket upgrade and stream events until the peer goes
    /// away.
    pub fn handle_upgrade(&self, ws: WebSocketUpgrade) -> Response {
        let rx = self.subscribe();
        debug!("activity subscriber connected");
        ws.on_upgrade(move |socket| forward_events(socket, rx))
    }
}

async fn forward_events(socket: WebSocket, mut rx: UnboundedReceiver<String>) {
    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if sink.send(Message::Text(event)).await.is_err() {
                break;
            }
        }
    });

    // Subscribers only listen; draining incoming frames keeps the protocol
    // (pings, close) serviced until the peer goes away.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(_)) = stream.next().await {}
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    // The dangling sender in the subscriber set is pruned at the next
    // publish.
    debug!("activity subscriber disconnected");
}

/// Axum middleware publishing one event per handled request.
pub async fn activity_middleware(
    State(broadcaster): State<Arc<ActivityBroadcaster>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(request).await;

    broadcaster.publish(&ActivityEvent {
        method,
        path,
        status: response.status().as_u16(),
        duration: start.elapsed().as_millis() as u64,
        timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
    });

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ActivityEvent {
        ActivityEvent {
            method: "GET".to_string(),
            path: "/bucket/key?x=1".to_string(),
            status: 200,
            duration: 12,
            timestamp: "2024-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&event()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["method"], "GET");
        assert_eq!(value["path"], "/bucket/key?x=1");
        assert_eq!(value["status"], 200);
        assert_eq!(value["duration"], 12);
        assert_eq!(value["timestamp"], "2024-01-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let broadcaster = ActivityBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(&event());

        let payload = rx.recv().await.unwrap();
        assert!(payload.contains("\"status\":200"));
    }

    #[tokio::test]
    async fn test_dead_subscriber_is_pruned() {
        let broadcaster = ActivityBroadcaster::new();
        let rx = broadcaster.subscribe();
        let _rx2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        drop(rx);
        broadcaster.publish(&event());
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let broadcaster = ActivityBroadcaster::new();
        broadcaster.publish(&event());
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
