use serde::{Deserialize, Serialize};

/// Wire payload mirrored across instances on `video:room:{id}` and
/// `video:user:{id}`. `sender_id` is the original author; a receiving
/// instance must drop an envelope whose `sender_id` is one of its own
/// locally connected clients (echo suppression) — that check happens in
/// the room coordinator, not here, since only the room knows who is
/// locally connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub room_id: String,
    pub event: String,
    pub payload: Vec<u8>,
    pub sender_id: String,
    pub roles: Option<Vec<String>>,
}
