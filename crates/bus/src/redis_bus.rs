use std::time::Duration;

use breaker::{BreakerConfig, BreakerError, CircuitBreaker};
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::{BusAdapter, room_channel, user_channel};
use crate::envelope::Envelope;

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Redis-backed bus (C2): `PUBLISH`/`SUBSCRIBE` for room and user channels,
/// `SADD`/`SREM`/`SMEMBERS` for the distributed roster sets. Every command
/// goes through a single shared [`CircuitBreaker`], mirroring the
/// one-breaker-per-dependency rule used by the SFU client crate.
pub struct RedisBus {
    client: redis::Client,
    manager: ConnectionManager,
    breaker: CircuitBreaker,
}

impl RedisBus {
    pub async fn connect(addr: &str, password: Option<&str>) -> anyhow::Result<Self> {
        let url = match password {
            Some(pw) if !pw.is_empty() => format!("redis://:{pw}@{addr}"),
            _ => format!("redis://{addr}"),
        };
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self {
            client,
            manager,
            breaker: CircuitBreaker::new("bus", BreakerConfig::default()),
        })
    }

    async fn listen_once(
        client: &redis::Client,
        channel: &str,
        sink: &async_channel::Sender<Envelope>,
    ) -> anyhow::Result<()> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        let mut stream = pubsub.on_message();

        while let Some(msg) = stream.next().await {
            let payload: Vec<u8> = msg.get_payload()?;
            match serde_json::from_slice::<Envelope>(&payload) {
                Ok(envelope) => {
                    if sink.send(envelope).await.is_err() {
                        // Receiver (room worker) is gone; stop listening.
                        break;
                    }
                }
                Err(err) => warn!(channel, error = %err, "dropping malformed bus envelope"),
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BusAdapter for RedisBus {
    async fn publish(
        &self,
        room_id: &str,
        event: &str,
        payload: Vec<u8>,
        sender_id: &str,
        roles: Option<Vec<String>>,
    ) -> anyhow::Result<()> {
        let envelope = Envelope {
            room_id: room_id.to_string(),
            event: event.to_string(),
            payload,
            sender_id: sender_id.to_string(),
            roles,
        };
        let channel = room_channel(room_id);
        let body = serde_json::to_vec(&envelope)?;
        let mut manager = self.manager.clone();

        let result = self
            .breaker
            .call(|| async move { manager.publish::<_, _, i64>(channel, body).await })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(BreakerError::Open) => Ok(()), // degrade gracefully, local delivery already happened
            Err(BreakerError::Inner(err)) => Err(err.into()),
        }
    }

    async fn publish_direct(
        &self,
        target_user_id: &str,
        event: &str,
        payload: Vec<u8>,
        sender_id: &str,
    ) -> anyhow::Result<()> {
        let envelope = Envelope {
            room_id: String::new(),
            event: event.to_string(),
            payload,
            sender_id: sender_id.to_string(),
            roles: None,
        };
        let channel = user_channel(target_user_id);
        let body = serde_json::to_vec(&envelope)?;
        let mut manager = self.manager.clone();

        let result = self
            .breaker
            .call(|| async move { manager.publish::<_, _, i64>(channel, body).await })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(BreakerError::Open) => Ok(()),
            Err(BreakerError::Inner(err)) => Err(err.into()),
        }
    }

    fn subscribe(&self, room_id: &str, sink: async_channel::Sender<Envelope>, cancel: CancellationToken) {
        let client = self.client.clone();
        let channel = room_channel(room_id);

        tokio::spawn(async move {
            let mut backoff = MIN_BACKOFF;
            loop {
                if cancel.is_cancelled() {
                    return;
                }

                let listen = Self::listen_once(&client, &channel, &sink);
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = listen => {
                        match result {
                            Ok(()) => return, // sink closed, room is gone
                            Err(err) => {
                                warn!(channel = %channel, error = %err, backoff_secs = backoff.as_secs(), "bus subscriber reconnecting");
                                tokio::select! {
                                    _ = cancel.cancelled() => return,
                                    _ = tokio::time::sleep(backoff) => {}
                                }
                                backoff = (backoff * 2).min(MAX_BACKOFF);
                            }
                        }
                    }
                }
            }
        });
    }

    async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let key = key.to_string();
        let member = member.to_string();
        let mut manager = self.manager.clone();

        let result = self
            .breaker
            .call(|| async move { manager.sadd::<_, _, i64>(key, member).await })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(BreakerError::Open) => Ok(()),
            Err(BreakerError::Inner(err)) => Err(err.into()),
        }
    }

    async fn set_rem(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let key = key.to_string();
        let member = member.to_string();
        let mut manager = self.manager.clone();

        let result = self
            .breaker
            .call(|| async move { manager.srem::<_, _, i64>(key, member).await })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(BreakerError::Open) => Ok(()),
            Err(BreakerError::Inner(err)) => Err(err.into()),
        }
    }

    async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>> {
        let key = key.to_string();
        let mut manager = self.manager.clone();

        let result = self
            .breaker
            .call(|| async move { manager.smembers::<_, Vec<String>>(key).await })
            .await;

        match result {
            Ok(members) => Ok(members),
            Err(BreakerError::Open) => Ok(Vec::new()),
            Err(BreakerError::Inner(err)) => Err(err.into()),
        }
    }

    fn breaker_open(&self) -> bool {
        self.breaker.is_open()
    }
}

/// Disabled bus, used when `REDIS_ENABLED=false`: every instance runs
/// standalone, rooms operate with local-only broadcast.
pub struct NoopBus;

#[async_trait::async_trait]
impl BusAdapter for NoopBus {
    async fn publish(
        &self,
        _room_id: &str,
        _event: &str,
        _payload: Vec<u8>,
        _sender_id: &str,
        _roles: Option<Vec<String>>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn publish_direct(
        &self,
        _target_user_id: &str,
        _event: &str,
        _payload: Vec<u8>,
        _sender_id: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn subscribe(&self, _room_id: &str, _sink: async_channel::Sender<Envelope>, _cancel: CancellationToken) {
        info!("bus disabled, skipping subscribe");
    }

    async fn set_add(&self, _key: &str, _member: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_rem(&self, _key: &str, _member: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_members(&self, _key: &str) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn breaker_open(&self) -> bool {
        false
    }
}
