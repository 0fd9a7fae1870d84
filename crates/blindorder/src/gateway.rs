//! Per-connection handler: decode, dispatch, fan-out, cleanup.
//!
//! Each accepted connection gets its own task running this handler. The
//! loop selects between inbound frames and an outbound queue: room
//! actors push broadcasts into the queue (in mutation order), and the
//! handler writes them to the socket. Direct replies (errors, the
//! leave acknowledgement) go through the same queue, so each connection
//! sees one totally ordered message stream.
//!
//! The gateway never mutates a room aggregate itself — it only requests
//! mutations through the store's serialized handles and forwards
//! snapshots.

use std::sync::Arc;

use blindorder_engine::PlayerId;
use blindorder_protocol::{ClientMessage, Codec, ServerMessage};
use blindorder_store::{
    ConnectionSender, DurableStore, RoomHandle, StoreError,
};
use blindorder_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::sessions::SessionBinding;
use crate::BlindorderError;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S: DurableStore>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S>>,
) -> Result<(), BlindorderError> {
    let conn_id = conn.id();
    // Participant identity is the connection identity; reconnects rebind
    // the participant to a new id.
    let player_id = PlayerId(conn_id.into_inner());
    tracing::debug!(%conn_id, "connection opened");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    loop {
        tokio::select! {
            outbound = out_rx.recv() => {
                // The channel cannot close while we hold out_tx.
                let Some(msg) = outbound else { break };
                let text = state.codec.encode(&msg)?;
                if conn.send(&text).await.is_err() {
                    break;
                }
            }
            inbound = conn.recv() => {
                match inbound {
                    Ok(Some(text)) => {
                        match state.codec.decode::<ClientMessage>(&text) {
                            Ok(msg) => {
                                dispatch(
                                    &state, conn_id, player_id, &out_tx, msg,
                                )
                                .await;
                            }
                            Err(e) => {
                                send(&out_tx, ServerMessage::Error(
                                    e.to_string(),
                                ));
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::debug!(%conn_id, "connection closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                }
            }
        }
    }

    // Connection loss is an implicit leave, with the same host-failover
    // and room-deletion policy as an explicit one.
    let binding = state.sessions.lock().await.unbind(conn_id);
    if let Some(binding) = binding {
        tracing::info!(
            %conn_id,
            room = %binding.room,
            username = %binding.username,
            "participant disconnected"
        );
        if let Err(e) = leave_current_room(&state, &binding).await {
            tracing::debug!(%conn_id, error = %e, "leave on disconnect failed");
        }
    }

    Ok(())
}

/// Routes one decoded client message. Operation failures become `error`
/// messages to this connection only; state changes reach everyone via
/// the room actor's broadcasts.
async fn dispatch<S: DurableStore>(
    state: &Arc<ServerState<S>>,
    conn_id: ConnectionId,
    player_id: PlayerId,
    out_tx: &ConnectionSender,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::JoinRoom {
            room_id,
            player_name,
            is_host,
        } => {
            if state.sessions.lock().await.get(conn_id).is_some() {
                send_error(out_tx, "Already in a room");
                return;
            }
            if let Err(reason) = validate_player_name(&player_name) {
                send_error(out_tx, &reason);
                return;
            }

            let handle = {
                let mut rooms = state.rooms.lock().await;
                rooms.get_or_load(&room_id).await
            };
            let handle = match handle {
                Ok(handle) => handle,
                Err(e) => {
                    send_error(out_tx, &e.to_string());
                    return;
                }
            };

            match handle
                .join(player_id, player_name.clone(), is_host, out_tx.clone())
                .await
            {
                Ok(()) => {
                    state.sessions.lock().await.bind(
                        conn_id,
                        SessionBinding {
                            room: room_id,
                            player_id,
                            username: player_name,
                        },
                    );
                }
                Err(e) => send_error(out_tx, &e.to_string()),
            }
        }

        ClientMessage::StartGame { room_id } => {
            match resolve(state, &room_id).await {
                Ok(handle) => {
                    if let Err(e) = handle.start_game(player_id).await {
                        send_error(out_tx, &e.to_string());
                    }
                }
                Err(e) => send_error(out_tx, &e.to_string()),
            }
        }

        ClientMessage::PlayNumber { room_id, number } => {
            match resolve(state, &room_id).await {
                // A failed-but-legal move is a broadcast game event, not
                // an error; only engine rejections come back here.
                Ok(handle) => {
                    if let Err(e) = handle.play_number(player_id, number).await
                    {
                        send_error(out_tx, &e.to_string());
                    }
                }
                Err(e) => send_error(out_tx, &e.to_string()),
            }
        }

        ClientMessage::ResetGame { room_id } => {
            match resolve(state, &room_id).await {
                Ok(handle) => {
                    if let Err(e) = handle.reset_game(player_id).await {
                        send_error(out_tx, &e.to_string());
                    }
                }
                Err(e) => send_error(out_tx, &e.to_string()),
            }
        }

        ClientMessage::LeaveRoom { .. } => {
            let binding = state.sessions.lock().await.unbind(conn_id);
            if let Some(binding) = binding {
                if let Err(e) = leave_current_room(state, &binding).await {
                    tracing::debug!(
                        %conn_id, error = %e, "leave room failed"
                    );
                }
            }
            send(out_tx, ServerMessage::LeftRoom);
        }
    }
}

/// Resolves a room handle, cold-loading from the durable store on first
/// access.
async fn resolve<S: DurableStore>(
    state: &Arc<ServerState<S>>,
    room_id: &blindorder_engine::RoomCode,
) -> Result<RoomHandle, StoreError> {
    let mut rooms = state.rooms.lock().await;
    rooms.get_or_load(room_id).await
}

async fn leave_current_room<S: DurableStore>(
    state: &Arc<ServerState<S>>,
    binding: &SessionBinding,
) -> Result<(), StoreError> {
    let mut rooms = state.rooms.lock().await;
    rooms.leave(&binding.room, binding.player_id).await?;
    Ok(())
}

fn send(out_tx: &ConnectionSender, msg: ServerMessage) {
    let _ = out_tx.send(msg);
}

fn send_error(out_tx: &ConnectionSender, message: &str) {
    let _ = out_tx.send(ServerMessage::Error(message.to_string()));
}

/// Boundary validation for display names (the reconnection key).
fn validate_player_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 50 {
        return Err("Username must be between 1 and 50 characters".into());
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'));
    if !valid {
        return Err("Username can only contain letters, numbers, spaces, \
                    hyphens, and underscores"
            .into());
    }
    Ok(())
}
