use std::sync::Arc;

use futures_util::StreamExt;
use sfu_client::SfuClient;
use tracing::warn;

use crate::room::{RoomCommand, RoomHandle};

/// Spawns the per-client SFU event reader (C8): subscribes to the SFU's
/// `listen_events` stream for one client and forwards every item back into
/// the owning room's mailbox as a [`RoomCommand::SfuEvent`], so only the
/// room's single writer ever touches client-facing state.
///
/// Returns immediately; the caller is responsible for aborting the
/// returned handle once the client disconnects; a failed `listen_events`
/// call (e.g. breaker open) logs and the task exits without ever
/// producing events, degrading to "no renegotiation/caption delivery"
/// rather than tearing down the session.
pub fn spawn_sfu_bridge(
    sfu: Arc<dyn SfuClient>,
    room: RoomHandle,
    client_id: String,
    room_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = match sfu.listen_events(&client_id, &room_id).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(client_id, room_id, %err, "sfu listen_events failed, no media events for this session");
                return;
            }
        };

        while let Some(event) = stream.next().await {
            room.send(RoomCommand::SfuEvent {
                client_id: client_id.clone(),
                event,
            });
        }
    })
}
