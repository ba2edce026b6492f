use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::client::Outbound;
use crate::error::HubError;
use crate::protocol::{ParticipantView, Role};
use crate::room::chat::ChatRing;
use crate::room::rate_limit::{CHAT_RATE_LIMIT, CHAT_RATE_WINDOW, ChatRateLimiter};

/// A reconnect for the same subject within this window replaces the prior
/// session instead of being refused as a conflicting duplicate join.
const RECONNECT_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub waiting_room_enabled: bool,
    pub max_participants: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            waiting_room_enabled: false,
            max_participants: 64,
        }
    }
}

pub struct ClientEntry {
    pub display_name: String,
    pub role: Role,
    pub outbound: Outbound,
    pub last_activity: Instant,
}

/// Authoritative room state, mutated only by the room coordinator's single
/// worker task — no lock needed, since only one task ever touches it.
pub struct Room {
    pub room_id: String,
    pub settings: RoomSettings,
    pub created_at: Instant,

    clients: std::collections::HashMap<String, ClientEntry>,
    hosts: HashSet<String>,
    participants: HashSet<String>,
    waiting: HashSet<String>,

    pub unmuted: HashSet<String>,
    pub camera_on: HashSet<String>,
    pub sharing: HashSet<String>,
    pub hand_raised: HashSet<String>,

    pub chat: ChatRing,
    pub chat_rate: ChatRateLimiter,
}

impl Room {
    pub fn new(room_id: String, settings: RoomSettings) -> Self {
        Self {
            room_id,
            settings,
            created_at: Instant::now(),
            clients: std::collections::HashMap::new(),
            hosts: HashSet::new(),
            participants: HashSet::new(),
            waiting: HashSet::new(),
            unmuted: HashSet::new(),
            camera_on: HashSet::new(),
            sharing: HashSet::new(),
            hand_raised: HashSet::new(),
            chat: ChatRing::new(),
            chat_rate: ChatRateLimiter::new(CHAT_RATE_LIMIT, CHAT_RATE_WINDOW),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn is_host(&self, client_id: &str) -> bool {
        self.hosts.contains(client_id)
    }

    pub fn is_waiting(&self, client_id: &str) -> bool {
        self.waiting.contains(client_id)
    }

    pub fn len(&self) -> usize {
        self.participants.len() + self.hosts.len()
    }

    pub fn client(&self, client_id: &str) -> Option<&ClientEntry> {
        self.clients.get(client_id)
    }

    pub fn touch(&mut self, client_id: &str) {
        if let Some(entry) = self.clients.get_mut(client_id) {
            entry.last_activity = Instant::now();
        }
    }

    /// First client admitted to an empty room becomes the host, per the
    /// usual meeting convention of "whoever opens the call owns it."
    ///
    /// A same-subject rejoin within [`RECONNECT_GRACE`] of the existing
    /// session's last activity replaces it in place rather than being
    /// refused: the stale socket is cancelled and the new one inherits the
    /// prior role, set membership, and media state untouched.
    pub fn insert_waiting_or_participant(
        &mut self,
        client_id: String,
        display_name: String,
        outbound: Outbound,
    ) -> Result<Role, HubError> {
        if let Some(existing) = self.clients.get(&client_id) {
            if existing.last_activity.elapsed() > RECONNECT_GRACE {
                return Err(HubError::Conflict(format!("{client_id} already in room")));
            }
            existing.outbound.replace();
            let role = existing.role;
            self.clients.insert(
                client_id,
                ClientEntry {
                    display_name,
                    role,
                    outbound,
                    last_activity: Instant::now(),
                },
            );
            return Ok(role);
        }

        let first_client = self.clients.is_empty();
        let role = if first_client {
            self.hosts.insert(client_id.clone());
            Role::Host
        } else if self.settings.waiting_room_enabled {
            self.waiting.insert(client_id.clone());
            Role::Waiting
        } else {
            if self.len() >= self.settings.max_participants {
                return Err(HubError::RoomFull);
            }
            self.participants.insert(client_id.clone());
            Role::Participant
        };

        self.clients.insert(
            client_id,
            ClientEntry {
                display_name,
                role,
                outbound,
                last_activity: Instant::now(),
            },
        );

        Ok(role)
    }

    pub fn admit_from_waiting(&mut self, target_id: &str) -> Result<(), HubError> {
        if !self.waiting.remove(target_id) {
            return Err(HubError::NotFound(format!("{target_id} not waiting")));
        }
        if self.len() >= self.settings.max_participants {
            self.waiting.insert(target_id.to_string());
            return Err(HubError::RoomFull);
        }
        self.participants.insert(target_id.to_string());
        if let Some(entry) = self.clients.get_mut(target_id) {
            entry.role = Role::Participant;
        }
        Ok(())
    }

    pub fn deny_waiting(&mut self, target_id: &str) -> Result<ClientEntry, HubError> {
        if !self.waiting.remove(target_id) {
            return Err(HubError::NotFound(format!("{target_id} not waiting")));
        }
        self.clients
            .remove(target_id)
            .ok_or_else(|| HubError::NotFound(format!("{target_id} not waiting")))
    }

    pub fn remove(&mut self, client_id: &str) -> Option<ClientEntry> {
        self.hosts.remove(client_id);
        self.participants.remove(client_id);
        self.waiting.remove(client_id);
        self.unmuted.remove(client_id);
        self.camera_on.remove(client_id);
        self.sharing.remove(client_id);
        self.hand_raised.remove(client_id);
        self.chat_rate.remove(client_id);
        self.clients.remove(client_id)
    }

    pub fn transfer_ownership(&mut self, from: &str, to: &str) -> Result<(), HubError> {
        if !self.participants.contains(to) {
            return Err(HubError::NotFound(format!("{to} not a participant")));
        }
        self.hosts.remove(from);
        self.participants.insert(from.to_string());
        self.participants.remove(to);
        self.hosts.insert(to.to_string());

        if let Some(entry) = self.clients.get_mut(from) {
            entry.role = Role::Participant;
        }
        if let Some(entry) = self.clients.get_mut(to) {
            entry.role = Role::Host;
        }
        Ok(())
    }

    pub fn hosts(&self) -> impl Iterator<Item = &String> {
        self.hosts.iter()
    }

    pub fn local_client_ids(&self) -> impl Iterator<Item = &String> {
        self.clients.keys()
    }

    pub fn roster(&self) -> Vec<ParticipantView> {
        self.clients
            .iter()
            .filter(|(id, _)| !self.waiting.contains(*id))
            .map(|(id, entry)| ParticipantView {
                client_id: id.clone(),
                display_name: entry.display_name.clone(),
                role: entry.role,
                camera_on: self.camera_on.contains(id),
                unmuted: self.unmuted.contains(id),
                sharing: self.sharing.contains(id),
                hand_raised: self.hand_raised.contains(id),
            })
            .collect()
    }
}
