// =============================================================================
// WebSocket Handler — Push-based view updates
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. An immediate full ViewSnapshot on connect.
//   2. A fresh full snapshot, checked every 500 ms, whenever the
//      state_version has changed since the last push.
//
// Text frames from the client are parsed as `SelectionUpdate`s, so a
// dashboard can drive the selection over the same socket.  Ping frames are
// answered with Pong.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::selection::SelectionUpdate;
use crate::view_state::SharedViewState;

const PUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SharedViewState>>,
) -> impl IntoResponse {
    info!("WebSocket connection accepted, upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Manages a single WebSocket connection lifecycle.
///
/// Runs two concurrent arms via `tokio::select!`:
///   1. **Push** — every 500 ms, send a new snapshot if the version moved.
///   2. **Recv** — selection updates, Ping/Pong and Close.
async fn handle_ws_connection(socket: WebSocket, state: Arc<SharedViewState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut sequence: u64 = 0;

    let mut last_sent_version = state.current_state_version();
    if let Err(e) = send_snapshot(&mut sender, &state, &mut sequence).await {
        warn!(error = %e, "failed to send initial WebSocket snapshot");
        return;
    }

    let mut push_interval = interval(PUSH_INTERVAL);

    loop {
        tokio::select! {
            // ── Push: check for version changes every 500 ms ────────────
            _ = push_interval.tick() => {
                let current_version = state.current_state_version();
                if current_version != last_sent_version {
                    match send_snapshot(&mut sender, &state, &mut sequence).await {
                        Ok(()) => last_sent_version = current_version,
                        Err(e) => {
                            debug!(error = %e, "WebSocket send failed, disconnecting");
                            break;
                        }
                    }
                }
            }

            // ── Recv: process incoming messages ─────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_text(&state, &text) {
                            if let Err(e) = sender.send(Message::Text(reply)).await {
                                debug!(error = %e, "WebSocket send failed, disconnecting");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "failed to send Pong, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error, disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!(sent = sequence, "WebSocket connection closed");
}

/// Apply a client text frame as a selection update.  Returns an error reply
/// for the client when the frame is rejected; accepted changes are pushed
/// through the regular snapshot path.
fn handle_text(state: &SharedViewState, text: &str) -> Option<String> {
    let update: SelectionUpdate = match serde_json::from_str(text) {
        Ok(update) => update,
        Err(e) => {
            debug!(error = %e, "ignoring non-selection WebSocket text frame");
            return Some(serde_json::json!({ "error": format!("invalid selection update: {e}") }).to_string());
        }
    };

    match state.apply_selection(&update) {
        Ok(applied) => {
            debug!(kind = ?applied.kind, "selection updated via WebSocket");
            None
        }
        Err(e) => {
            warn!(error = %e, "WebSocket selection update rejected");
            Some(serde_json::json!({ "error": e.to_string() }).to_string())
        }
    }
}

/// Serialize and send the current ViewSnapshot.
async fn send_snapshot<S>(
    sender: &mut S,
    state: &SharedViewState,
    sequence: &mut u64,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let snapshot = match state.build_snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            // Formatting failures are not network errors; keep the socket.
            warn!(error = %e, "failed to build view snapshot");
            return Ok(());
        }
    };

    match serde_json::to_string(&snapshot) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            *sequence += 1;
            debug!(version = snapshot.version, seq = *sequence, "WebSocket snapshot sent");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "failed to serialize snapshot");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;

    #[test]
    fn text_frame_drives_selection() {
        let state = SharedViewState::new(DashboardConfig::default());
        assert!(handle_text(&state, r#"{ "interval": "Hour" }"#).is_none());
        assert_eq!(state.ticket().epoch, 1);

        let reply = handle_text(&state, r#"{ "instrument": "NOPE-USD" }"#).unwrap();
        assert!(reply.contains("NOPE-USD"));

        let reply = handle_text(&state, "ping").unwrap();
        assert!(reply.contains("invalid selection update"));
    }
}
