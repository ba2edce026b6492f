use tokio_util::sync::CancellationToken;

use crate::envelope::Envelope;

/// Cross-instance pub/sub and distributed-set substrate (C2). Every
/// implementation degrades gracefully: when the underlying transport is
/// unavailable, publishes are swallowed (local delivery already happened)
/// and set reads return empty rather than propagating an error up into the
/// room worker.
#[async_trait::async_trait]
pub trait BusAdapter: Send + Sync {
    async fn publish(
        &self,
        room_id: &str,
        event: &str,
        payload: Vec<u8>,
        sender_id: &str,
        roles: Option<Vec<String>>,
    ) -> anyhow::Result<()>;

    async fn publish_direct(
        &self,
        target_user_id: &str,
        event: &str,
        payload: Vec<u8>,
        sender_id: &str,
    ) -> anyhow::Result<()>;

    /// Subscribes to `video:room:{room_id}`, forwarding every decoded
    /// envelope into `sink` until `cancel` fires. Reconnects with
    /// exponential backoff (capped at 30s) on transport errors.
    fn subscribe(&self, room_id: &str, sink: async_channel::Sender<Envelope>, cancel: CancellationToken);

    async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<()>;

    async fn set_rem(&self, key: &str, member: &str) -> anyhow::Result<()>;

    async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>>;

    fn breaker_open(&self) -> bool;
}

pub fn room_channel(room_id: &str) -> String {
    format!("video:room:{room_id}")
}

pub fn user_channel(user_id: &str) -> String {
    format!("video:user:{user_id}")
}
