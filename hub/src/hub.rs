use std::sync::Arc;
use std::time::{Duration, Instant};

use bus::BusAdapter;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use salvo::websocket::WebSocket;
use sfu_client::SfuClient;
use tracing::{info, warn};

use crate::room::{self, RoomCommand, RoomHandle, RoomSettings};

const MAX_RESTARTS_PER_WINDOW: usize = 2;
const RESTART_WINDOW: Duration = Duration::from_secs(60);
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Top-level registry of live rooms (C7). One entry per room with at least
/// one connected client anywhere in the cluster's knowledge of this
/// instance; the actual authoritative [`room::Room`] lives inside the
/// actor task a [`RoomHandle`] addresses.
pub struct Hub {
    rooms: DashMap<String, RoomHandle>,
    bus: Arc<dyn BusAdapter>,
    sfu: Arc<dyn SfuClient>,
    summary_addr: Option<String>,
}

impl Hub {
    pub fn new(bus: Arc<dyn BusAdapter>, sfu: Arc<dyn SfuClient>, summary_addr: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            bus,
            sfu,
            summary_addr,
        })
    }

    pub fn bus_breaker_open(&self) -> bool {
        self.bus.breaker_open()
    }

    /// Returns the handle for `room_id`, spawning a fresh actor (and its
    /// crash supervisor) if none exists yet.
    pub fn get_or_create(self: &Arc<Self>, room_id: &str) -> RoomHandle {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let (handle, join_handle) = room::spawn(
                    room_id.to_string(),
                    RoomSettings::default(),
                    self.bus.clone(),
                    self.sfu.clone(),
                    self.summary_addr.clone(),
                );
                entry.insert(handle.clone());
                tokio::spawn(supervise(self.clone(), room_id.to_string(), join_handle));
                handle
            }
        }
    }

    pub async fn serve_ws(
        self: &Arc<Self>,
        room_id: String,
        ws: WebSocket,
        client_id: String,
        display_name: String,
        target_lang: Option<String>,
    ) {
        let handle = self.get_or_create(&room_id);
        let bridge = crate::bridge::spawn_sfu_bridge(
            self.sfu.clone(),
            handle.clone(),
            client_id.clone(),
            room_id,
        );
        crate::client::run(ws, handle, client_id, display_name, target_lang).await;
        bridge.abort();
    }

    /// Announces closure to every room, then waits up to `timeout` for them
    /// to drain naturally before force-cancelling whatever's left.
    pub async fn shutdown(&self, timeout: Duration) {
        for entry in self.rooms.iter() {
            entry.value().send(RoomCommand::Shutdown);
        }

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline && !self.rooms.is_empty() {
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }

        if !self.rooms.is_empty() {
            warn!(remaining = self.rooms.len(), "force-closing rooms after shutdown grace period");
            for entry in self.rooms.iter() {
                entry.value().cancel.cancel();
            }
            self.rooms.clear();
        }
    }
}

/// Awaits a room actor's task, restarting it (with fresh, empty state —
/// clients must rejoin) on panic, up to [`MAX_RESTARTS_PER_WINDOW`] times
/// within [`RESTART_WINDOW`]; a room that keeps crashing is left closed.
async fn supervise(hub: Arc<Hub>, room_id: String, mut join_handle: tokio::task::JoinHandle<()>) {
    let mut restarts: Vec<Instant> = Vec::new();

    loop {
        let result = join_handle.await;
        hub.rooms.remove(&room_id);

        match result {
            Ok(()) => return,
            Err(panic) => {
                warn!(room_id = %room_id, ?panic, "room actor panicked");

                let now = Instant::now();
                restarts.retain(|t| now.duration_since(*t) < RESTART_WINDOW);
                if restarts.len() >= MAX_RESTARTS_PER_WINDOW {
                    warn!(room_id = %room_id, "too many crashes, leaving room closed");
                    return;
                }
                restarts.push(now);

                let (handle, new_join_handle) = room::spawn(
                    room_id.clone(),
                    RoomSettings::default(),
                    hub.bus.clone(),
                    hub.sfu.clone(),
                    hub.summary_addr.clone(),
                );
                hub.rooms.insert(room_id.clone(), handle);
                info!(room_id = %room_id, "room actor restarted");
                join_handle = new_join_handle;
            }
        }
    }
}
