use thiserror::Error;

/// Closed error taxonomy surfaced to clients and used for propagation
/// decisions in the room coordinator, mirroring the split the teacher
/// draws between a `thiserror` enum at the edge (`RoomError`, `ChatError`)
/// and `anyhow::Error` at internal plumbing seams (bus, gRPC).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HubError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("room is full")]
    RoomFull,
    #[error("client is a slow consumer")]
    SlowConsumer,
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("operation timed out")]
    Timeout,
    #[error("dependency unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// A short machine-readable tag, used as the `reason` field on error
    /// frames sent back to the client.
    pub fn code(&self) -> &'static str {
        match self {
            HubError::Unauthorized(_) => "unauthorized",
            HubError::Forbidden(_) => "forbidden",
            HubError::NotFound(_) => "not_found",
            HubError::Conflict(_) => "conflict",
            HubError::RoomFull => "room_full",
            HubError::SlowConsumer => "slow_consumer",
            HubError::ProtocolError(_) => "protocol_error",
            HubError::Timeout => "timeout",
            HubError::Unavailable(_) => "unavailable",
            HubError::Internal(_) => "internal_error",
        }
    }
}

impl From<sfu_client::SfuClientError> for HubError {
    fn from(err: sfu_client::SfuClientError) -> Self {
        match err {
            sfu_client::SfuClientError::Unavailable => {
                HubError::Unavailable("sfu circuit breaker open".to_string())
            }
            other => HubError::Internal(other.to_string()),
        }
    }
}
