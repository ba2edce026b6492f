use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bus::{BusAdapter, Envelope};
use hub::client::Outbound;
use hub::protocol::{ProtocolEvent, decode_frame};
use hub::room::{Inbound, RoomCommand, RoomHandle, RoomSettings};
use sfu_client::{EventStream, SfuClient, SfuClientError, SignalKind};
use tokio_util::sync::CancellationToken;

/// Always hands back a fixed SDP offer and never produces SFU events;
/// enough for exercising the room coordinator without a live SFU.
pub struct FakeSfuClient {
    pub offer: String,
}

#[async_trait::async_trait]
impl SfuClient for FakeSfuClient {
    async fn create_session(&self, _client_id: &str, _room_id: &str) -> Result<String, SfuClientError> {
        Ok(self.offer.clone())
    }

    async fn handle_signal(&self, _client_id: &str, _room_id: &str, _signal: SignalKind) -> Result<(), SfuClientError> {
        Ok(())
    }

    async fn delete_session(&self, _client_id: &str, _room_id: &str) -> Result<(), SfuClientError> {
        Ok(())
    }

    async fn listen_events(&self, _client_id: &str, _room_id: &str) -> Result<EventStream, SfuClientError> {
        Ok(Box::pin(futures_util::stream::empty()))
    }

    fn breaker_open(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct BusState {
    subs: HashMap<String, Vec<async_channel::Sender<Envelope>>>,
    sets: HashMap<String, HashSet<String>>,
    breaker_open: bool,
}

/// In-memory stand-in for the Redis-backed bus. Cloning shares the same
/// underlying state, so two clones can stand in for two hub instances
/// talking over the same bus.
#[derive(Clone, Default)]
pub struct FakeBus {
    state: Arc<Mutex<BusState>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_breaker_open(&self, open: bool) {
        self.state.lock().unwrap().breaker_open = open;
    }
}

#[async_trait::async_trait]
impl BusAdapter for FakeBus {
    async fn publish(
        &self,
        room_id: &str,
        event: &str,
        payload: Vec<u8>,
        sender_id: &str,
        roles: Option<Vec<String>>,
    ) -> anyhow::Result<()> {
        let (open, subs) = {
            let state = self.state.lock().unwrap();
            (state.breaker_open, state.subs.get(room_id).cloned().unwrap_or_default())
        };
        if open {
            return Ok(());
        }
        let envelope = Envelope {
            room_id: room_id.to_string(),
            event: event.to_string(),
            payload,
            sender_id: sender_id.to_string(),
            roles,
        };
        for sink in subs {
            let _ = sink.send(envelope.clone()).await;
        }
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

    fn subscribe(&self, room_id: &str, sink: async_channel::Sender<Envelope>, _cancel: CancellationToken) {
        self.state.lock().unwrap().subs.entry(room_id.to_string()).or_default().push(sink);
    }

    async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<()> {
        self.state.lock().unwrap().sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn set_rem(&self, key: &str, member: &str) -> anyhow::Result<()> {
        if let Some(set) = self.state.lock().unwrap().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.breaker_open {
            return Ok(vec![]);
        }
        Ok(state.sets.get(key).cloned().unwrap_or_default().into_iter().collect())
    }

    fn breaker_open(&self) -> bool {
        self.state.lock().unwrap().breaker_open
    }
}

pub fn default_settings() -> RoomSettings {
    RoomSettings {
        waiting_room_enabled: false,
        max_participants: 64,
    }
}

pub fn waiting_room_settings() -> RoomSettings {
    RoomSettings {
        waiting_room_enabled: true,
        max_participants: 64,
    }
}

pub async fn recv_event(rx: &async_channel::Receiver<Vec<u8>>) -> ProtocolEvent {
    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an outbound frame")
        .expect("outbound channel closed before a frame arrived");
    decode_frame(&frame).expect("frame failed to decode")
}

pub async fn join_client(room: &RoomHandle, client_id: &str, display_name: &str) -> async_channel::Receiver<Vec<u8>> {
    let (outbound, rx) = Outbound::new();
    room.join(client_id.to_string(), display_name.to_string(), None, outbound)
        .await
        .expect("join was rejected");
    rx
}

pub fn send_event(room: &RoomHandle, client_id: &str, event: ProtocolEvent) {
    room.send(RoomCommand::Event(Inbound {
        client_id: client_id.to_string(),
        event,
    }));
}
