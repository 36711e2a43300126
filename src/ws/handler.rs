//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::RoomCommand;
use crate::session::PlayerSession;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    // Connection identity doubles as player identity; unique for the
    // lifetime of the process
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let session = match state.sessions.join(player_id).await {
        Ok(session) => session,
        Err(e) => {
            warn!(player_id = %player_id, error = %e, "Could not place connection in a room");
            let _ = send_msg(&mut ws_sink, &ServerMsg::RoomClosed).await;
            return;
        }
    };

    info!(player_id = %player_id, room_id = %session.room.id, "Joined room");

    let init = ServerMsg::Init {
        id: session.ack.id,
        color: session.ack.color,
    };
    if let Err(e) = send_msg(&mut ws_sink, &init).await {
        error!(player_id = %player_id, error = %e, "Failed to send init");
        state.sessions.disconnect(player_id).await;
        return;
    }

    run_session(player_id, ws_sink, ws_stream, session, &state).await;

    // Cleanup on disconnect: tell the room and drop the routing entry
    state.sessions.disconnect(player_id).await;
    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    session: PlayerSession,
    state: &AppState,
) {
    let rate_limiter = ConnectionRateLimiter::new();
    let PlayerSession {
        mut broadcast_rx, ..
    } = session;

    // Outbound funnel: room broadcasts and direct replies merge here so
    // one task owns the sink
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(64);

    // Writer task: outbound queue -> WebSocket
    let writer_player_id = player_id;
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %writer_player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Forwarder task: room broadcast -> outbound queue. try_send keeps
    // a slow client from ever applying backpressure to the room tick.
    let forward_tx = out_tx.clone();
    let forward_player_id = player_id;
    let forwarder_handle = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(msg) => {
                    if forward_tx.try_send(msg).is_err() {
                        debug!(player_id = %forward_player_id, "Outbound queue full, dropping message");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(player_id = %forward_player_id, lagged = n, "Client lagged, skipping snapshots");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(player_id = %forward_player_id, "Room broadcast closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> room command channel
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let cmd = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::PointerMove { pointer }) => {
                        if !rate_limiter.check_pointer() {
                            continue;
                        }
                        RoomCommand::PointerMove { player_id, pointer }
                    }
                    Ok(ClientMsg::ExitGame) => RoomCommand::ExitGame { player_id },
                    Err(e) => {
                        // Malformed input: drop it, keep the connection
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                if !state.sessions.route(player_id, cmd).await {
                    debug!(player_id = %player_id, "Room gone, notifying client");
                    let _ = out_tx.send(ServerMsg::RoomClosed).await;
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    forwarder_handle.abort();
    // Give the writer a bounded chance to flush anything already queued
    drop(out_tx);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), writer_handle).await;
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
