use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use save_keeper::GameType;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::state::AppState;

const BROADCAST_CAPACITY: usize = 256;
const MAX_QUEUE_PER_GAME: usize = 100;

#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub event_type: String,
    pub payload: Value,
    pub timestamp: i64,
}

impl QueuedMessage {
    fn to_text(&self) -> String {
        envelope(&self.event_type, &self.payload)
    }
}

fn envelope(event_type: &str, payload: &Value) -> String {
    serde_json::json!({
        "type": event_type,
        "payload": payload,
    })
    .to_string()
}

/// Fans store events out to every connected UI socket.
///
/// Backup events are also kept per game type so a client that reconnects
/// can ask for what it missed.
#[derive(Clone)]
pub struct UiBroadcaster {
    tx: broadcast::Sender<String>,
    queue: Arc<DashMap<GameType, VecDeque<QueuedMessage>>>,
}

impl Default for UiBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl UiBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            queue: Arc::new(DashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn broadcast(&self, event_type: &str, game: Option<GameType>, payload: Value) {
        if let Some(game) = game {
            let mut entry = self.queue.entry(game).or_default();
            entry.push_back(QueuedMessage {
                event_type: event_type.to_string(),
                payload: payload.clone(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
            if entry.len() > MAX_QUEUE_PER_GAME {
                entry.pop_front();
            }
        }

        // No subscribers is fine
        let _ = self.tx.send(envelope(event_type, &payload));
    }

    /// Queued events newer than `since` (ms since epoch), oldest first.
    /// `None` replays every game.
    pub fn get_queued_messages(&self, game: Option<GameType>, since: i64) -> Vec<QueuedMessage> {
        let mut messages: Vec<QueuedMessage> = match game {
            Some(game) => self
                .queue
                .get(&game)
                .map(|q| q.iter().filter(|m| m.timestamp > since).cloned().collect())
                .unwrap_or_default(),
            None => self
                .queue
                .iter()
                .flat_map(|q| {
                    q.value()
                        .iter()
                        .filter(|m| m.timestamp > since)
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .collect(),
        };
        messages.sort_by_key(|m| m.timestamp);
        messages
    }
}

/// Parse a `replay:request` frame into `(game, since)`.
fn replay_request(text: &str) -> Option<(Option<GameType>, i64)> {
    let parsed: Value = serde_json::from_str(text).ok()?;
    if parsed.get("type").and_then(|t| t.as_str()) != Some("replay:request") {
        return None;
    }
    let payload = parsed.get("payload");
    let game = payload
        .and_then(|p| p.get("type"))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok());
    let since = payload
        .and_then(|p| p.get("since"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    Some((game, since))
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ui_socket(socket, state))
}

async fn handle_ui_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ui.subscribe();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            event = rx.recv() => match event {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "UI socket fell behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    // Replays go to the requesting socket only
                    if let Some((game, since)) = replay_request(text.as_str()) {
                        for m in state.ui.get_queued_messages(game, since) {
                            if sender.send(Message::Text(m.to_text().into())).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
