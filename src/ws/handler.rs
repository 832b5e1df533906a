//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::ServerMsg;
use crate::ws::session::Session;

/// Queued outbound messages per connection before broadcasts start dropping
const OUTBOUND_CAPACITY: usize = 256;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);
    let mut lobby_rx = state.rooms.subscribe();
    let mut session = Session::new(state, outbound_tx);
    let session_id = session.id();
    info!(session_id = %session_id, "New WebSocket connection");

    // Spawn writer task: outbound queue -> WebSocket
    let mut writer_handle = tokio::spawn(write_loop(ws_sink, outbound_rx));

    // Reader loop: WebSocket -> session
    loop {
        let result = tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(result) => result,
                None => break,
            },
            update = lobby_rx.recv() => match update {
                Ok(update) => {
                    session.notify_lobby(update);
                    continue;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session_id = %session_id, skipped, "Lobby feed lagged");
                    continue;
                }
                Err(RecvError::Closed) => {
                    debug!(session_id = %session_id, "Lobby feed closed");
                    break;
                }
            },
            _ = &mut writer_handle => {
                debug!(session_id = %session_id, "Writer task ended");
                break;
            }
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(session_id = %session_id, "Rate limited input message");
                    continue;
                }

                if session.handle_text(&text).await.is_err() {
                    debug!(session_id = %session_id, "Outbound channel closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup on disconnect
    session.leave_room();
    drop(session);
    writer_handle.abort();

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Drain the outbound queue onto the socket until either side closes
async fn write_loop(
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(error = %e, "WebSocket send failed");
            break;
        }
    }
    if let Err(e) = ws_sink.close().await {
        debug!(error = %e, "WebSocket close failed");
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
