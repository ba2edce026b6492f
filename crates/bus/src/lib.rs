//! Cross-instance bus (C2): publish/subscribe overlay plus a distributed
//! participant roster, so any hub instance can render a complete view of a
//! room even though only one instance holds the authoritative `Room` actor
//! for any given client.

mod adapter;
mod envelope;
mod redis_bus;

use serde::{Deserialize, Serialize};

pub use adapter::{BusAdapter, room_channel, user_channel};
pub use envelope::Envelope;
pub use redis_bus::{NoopBus, RedisBus};

/// Roster keys as laid out in the external interface: one Redis set per
/// role partition, holding JSON-encoded `{client_id, display_name}` members.
pub fn participants_key(room_id: &str) -> String {
    format!("room:{room_id}:participants")
}

pub fn hosts_key(room_id: &str) -> String {
    format!("room:{room_id}:hosts")
}

pub fn waiting_key(room_id: &str) -> String {
    format!("room:{room_id}:waiting")
}

/// One member of a roster set: enough for a sibling instance to render a
/// participant it has no local connection for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub client_id: String,
    pub display_name: String,
}

impl RosterEntry {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_match_external_interface() {
        assert_eq!(room_channel("r-1"), "video:room:r-1");
        assert_eq!(user_channel("u-A"), "video:user:u-A");
        assert_eq!(participants_key("r-1"), "room:r-1:participants");
        assert_eq!(hosts_key("r-1"), "room:r-1:hosts");
        assert_eq!(waiting_key("r-1"), "room:r-1:waiting");
    }

    #[test]
    fn roster_entry_round_trips_through_json() {
        let entry = RosterEntry {
            client_id: "u-A".to_string(),
            display_name: "Ada".to_string(),
        };
        let decoded = RosterEntry::decode(&entry.encode()).unwrap();
        assert_eq!(decoded.client_id, "u-A");
        assert_eq!(decoded.display_name, "Ada");
    }

    #[tokio::test]
    async fn noop_bus_degrades_gracefully() {
        let bus = NoopBus;
        // A disabled bus has no real breaker to trip; readiness shouldn't be
        // gated on it the way it would be for a live `RedisBus`.
        assert!(!bus.breaker_open());
        bus.publish("r-1", "chat", vec![1, 2, 3], "u-A", None)
            .await
            .unwrap();
        bus.publish_direct("u-B", "signal", vec![], "u-A")
            .await
            .unwrap();
        bus.set_add(&participants_key("r-1"), "u-A").await.unwrap();
        let members = bus.set_members(&participants_key("r-1")).await.unwrap();
        assert!(members.is_empty());
    }
}
