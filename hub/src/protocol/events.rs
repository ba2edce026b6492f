use serde::{Deserialize, Serialize};

/// Media track kind used by `ToggleMedia` and `MediaStateChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Host,
    Participant,
    Waiting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantView {
    pub client_id: String,
    pub display_name: String,
    pub role: Role,
    pub camera_on: bool,
    pub unmuted: bool,
    pub sharing: bool,
    pub hand_raised: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: u64,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub timestamp: i64,
    pub is_private: bool,
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

/// Top-level tagged union carried by every frame (§6). Unknown tags decode
/// to [`ProtocolEvent::Unknown`] rather than an error, so older/newer
/// clients never break the connection over a variant they don't recognize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProtocolEvent {
    Join {
        display_name: String,
        target_lang: Option<String>,
    },
    JoinResponse {
        success: bool,
        reason: Option<String>,
        participants: Vec<ParticipantView>,
        role: Role,
    },
    RoomState {
        participants: Vec<ParticipantView>,
    },
    SignalEvent {
        kind: SignalKind,
        sdp: Option<String>,
        candidate: Option<String>,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u32>,
    },
    TrackAdded {
        stream_id: String,
        user_id: String,
        track_id: String,
        is_video: bool,
    },
    SignalRequest {
        target_id: Option<String>,
        kind: SignalKind,
        sdp: Option<String>,
        candidate: Option<String>,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u32>,
    },
    ChatEvent {
        entry: ChatEntry,
    },
    DeleteChatEvent {
        id: u64,
    },
    RecentChats {
        entries: Vec<ChatEntry>,
    },
    GetRecentChats,
    AdminEvent {
        kind: String,
        target_id: Option<String>,
    },
    MediaStateChanged {
        client_id: String,
        kind: MediaKind,
        enabled: bool,
    },
    HandStateChanged {
        client_id: String,
        raised: bool,
    },
    RaiseHand,
    LowerHand,
    ScreenShareChanged {
        client_id: String,
        sharing: bool,
    },
    AdminAction {
        action: AdminActionKind,
        target_id: String,
    },
    ToggleMedia {
        kind: MediaKind,
        enabled: bool,
    },
    WaitingRequest {
        target_id: String,
        display_name: String,
    },
    ScreenShareRequest,
    AcceptWaiting {
        target_id: String,
    },
    DenyWaiting {
        target_id: String,
    },
    Caption {
        user_id: String,
        language: String,
        text: String,
        is_final: bool,
    },
    Heartbeat,
    Summarize,
    SummaryResult {
        success: bool,
        summary: Option<String>,
    },
    /// Sent when the server rejects an action outside of `Join` (which
    /// answers with `JoinResponse` instead). `code` is a `HubError::code()`
    /// tag, `message` is a human-readable detail for logging/debugging.
    Error {
        code: String,
        message: String,
    },
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminActionKind {
    TransferOwnership,
    Kick,
    AcceptScreenShare,
    DenyScreenShare,
}
