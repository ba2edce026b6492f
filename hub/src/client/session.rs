use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use salvo::websocket::{Message, WebSocket};
use tracing::{info, warn};

use crate::client::Outbound;
use crate::error::HubError;
use crate::protocol::{ProtocolEvent, Role, decode_frame, encode_frame};
use crate::room::{Inbound, RoomCommand, RoomHandle};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives one client's WebSocket connection end to end: joins the room,
/// splits the socket into independent read/write halves, and tears both
/// down together once either side closes.
pub async fn run(
    ws: WebSocket,
    room: RoomHandle,
    client_id: String,
    display_name: String,
    target_lang: Option<String>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (outbound, outbound_rx) = Outbound::new();

    if let Err(err) = room
        .join(client_id.clone(), display_name, target_lang, outbound.clone())
        .await
    {
        warn!(client_id, %err, "join rejected");
        send_join_rejection(&mut ws_tx, &err).await;
        let _ = ws_tx.send(Message::close()).await;
        return;
    }

    let write_task = tokio::spawn(async move {
        loop {
            match tokio::time::timeout(HEARTBEAT_INTERVAL, outbound_rx.recv()).await {
                Ok(Ok(frame)) => {
                    if ws_tx.send(Message::binary(frame)).await.is_err() {
                        break;
                    }
                }
                Ok(Err(_)) => break, // channel closed
                Err(_) => {
                    let Ok(heartbeat) = encode_frame(&ProtocolEvent::Heartbeat) else {
                        break;
                    };
                    if ws_tx.send(Message::binary(heartbeat)).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.send(Message::close()).await;
    });

    let replaced = read_loop(&mut ws_rx, &room, &client_id, &outbound).await;

    if !replaced {
        room.send(RoomCommand::Disconnect {
            client_id: client_id.clone(),
        });
    }
    outbound.close();
    write_task.abort();
    info!(client_id, replaced, "session closed");
}

/// Returns `true` if the loop exited because a reconnecting client replaced
/// this session rather than because the socket itself closed — in that case
/// the room already holds the new connection and must not be told to leave.
async fn read_loop(ws_rx: &mut SplitStream<WebSocket>, room: &RoomHandle, client_id: &str, outbound: &Outbound) -> bool {
    loop {
        let next = tokio::select! {
            next = tokio::time::timeout(HEARTBEAT_TIMEOUT, ws_rx.next()) => match next {
                Ok(next) => next,
                Err(_) => {
                    warn!(client_id, "heartbeat timeout, closing session");
                    return false;
                }
            },
            _ = outbound.cancelled() => {
                info!(client_id, "session replaced by a newer connection");
                return true;
            }
        };

        let Some(msg) = next else { return false };
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                warn!(client_id, %err, "websocket read error");
                return false;
            }
        };

        if msg.is_close() {
            return false;
        }
        if !msg.is_binary() {
            continue;
        }

        match decode_frame(msg.as_bytes()) {
            Ok(event) => room.send(RoomCommand::Event(Inbound {
                client_id: client_id.to_string(),
                event,
            })),
            Err(err) => {
                warn!(client_id, %err, "malformed frame, closing session");
                if let Ok(frame) = encode_frame(&ProtocolEvent::Error {
                    code: "protocol_error".to_string(),
                    message: err.to_string(),
                }) {
                    let _ = outbound.send(frame);
                }
                return false;
            }
        }
    }
}

/// Sends a failed `JoinResponse` naming the rejection reason. Written
/// directly to the socket rather than through `Outbound`, since the write
/// task that drains that queue isn't spawned until after a successful join.
async fn send_join_rejection(ws_tx: &mut SplitSink<WebSocket, Message>, err: &HubError) {
    let frame = match encode_frame(&ProtocolEvent::JoinResponse {
        success: false,
        reason: Some(err.code().to_string()),
        participants: vec![],
        role: Role::Waiting,
    }) {
        Ok(frame) => frame,
        Err(_) => return,
    };
    let _ = ws_tx.send(Message::binary(frame)).await;
}
