use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::api::SharedState;
use super::models::*;
use crate::schedule::{Dashboard, build_dashboard, local_now};

const PING_EVERY: Duration = Duration::from_secs(30);
/// A viewer that leaves a ping unanswered this long is dropped.
const PONG_GRACE: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    /// Full board state, recomputed against the current time.
    DashboardUpdated {
        dashboard: Dashboard,
    },

    ReleaseCreated {
        release: Release,
    },
    ReleaseUpdated {
        release: Release,
    },
    ReleaseDeleted {
        release_id: i64,
    },

    HistoryRecorded {
        entry: VersionHistoryEntry,
    },
    HistoryDeleted {
        history_id: i64,
    },

    CustomerModuleSaved {
        record: CustomerModule,
    },
    CustomerModuleDeleted {
        record_id: i64,
    },
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sink, stream) = socket.split();
    // Subscribe before reading so no update slips between the snapshot and the loop.
    let updates = state.ws_tx.subscribe();

    match state.db.call(|db| db.list_snapshots()).await {
        Ok(snapshots) => {
            let msg = WsMessage::DashboardUpdated {
                dashboard: build_dashboard(&snapshots, local_now()),
            };
            if let Ok(json) = serde_json::to_string(&msg) {
                if sink.send(Message::Text(json.into())).await.is_err() {
                    return;
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to load initial dashboard for websocket"),
    }

    tracing::debug!("websocket client connected");
    run_socket_loop(sink, stream, updates).await;
    tracing::debug!("websocket client disconnected");
}

/// Tracks whether the viewer still answers pings.
#[derive(Debug)]
struct Keepalive {
    last_pong: Instant,
    outstanding: bool,
}

impl Keepalive {
    fn new(now: Instant) -> Self {
        Self {
            last_pong: now,
            outstanding: false,
        }
    }

    fn pinged(&mut self) {
        self.outstanding = true;
    }

    fn ponged(&mut self, now: Instant) {
        self.last_pong = now;
        self.outstanding = false;
    }

    fn expired(&self, now: Instant) -> bool {
        self.outstanding && now.duration_since(self.last_pong) > PONG_GRACE
    }
}

/// Forwards board broadcasts to one viewer until it disconnects or stops
/// answering pings. Anything the viewer sends besides pong and close is ignored.
async fn run_socket_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut stream: SplitStream<WebSocket>,
    mut updates: broadcast::Receiver<String>,
) {
    let mut pings = tokio::time::interval_at(Instant::now() + PING_EVERY, PING_EVERY);
    let mut keepalive = Keepalive::new(Instant::now());

    loop {
        tokio::select! {
            _ = pings.tick() => {
                if keepalive.expired(Instant::now()) {
                    tracing::debug!("websocket viewer stopped answering pings");
                    break;
                }
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                keepalive.pinged();
            }

            update = updates.recv() => match update {
                Ok(json) => {
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The next DashboardUpdated carries the full state again.
                    tracing::warn!(skipped, "websocket viewer fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Pong(_))) => keepalive.ponged(Instant::now()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sink.send(Message::Close(None)).await;
}

// ── Broadcast ────────────────────────────────────────────────────────

/// Sends `msg` to every connected viewer. No viewers is not an error.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode websocket message");
            return;
        }
    };
    let _ = tx.send(json);
}
