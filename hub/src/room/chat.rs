use std::collections::VecDeque;

use crate::error::HubError;
use crate::protocol::ChatEntry;

pub const CHAT_RING_CAPACITY: usize = 200;
pub const CHAT_CONTENT_MAX_BYTES: usize = 10 * 1024;

/// Bounded, FIFO-evicting chat history for one room.
#[derive(Debug, Default)]
pub struct ChatRing {
    entries: VecDeque<ChatEntry>,
    next_id: u64,
}

impl ChatRing {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(CHAT_RING_CAPACITY),
            next_id: 1,
        }
    }

    /// Appends a message, enforcing the content cap, evicting the oldest
    /// entry when the ring is at capacity.
    pub fn push(
        &mut self,
        sender_id: String,
        sender_name: String,
        content: String,
        timestamp: i64,
        is_private: bool,
        target_id: Option<String>,
    ) -> Result<ChatEntry, HubError> {
        if content.len() > CHAT_CONTENT_MAX_BYTES {
            return Err(HubError::ProtocolError("chat content exceeds 10KB".to_string()));
        }

        if self.entries.len() == CHAT_RING_CAPACITY {
            self.entries.pop_front();
        }

        let entry = ChatEntry {
            id: self.next_id,
            sender_id,
            sender_name,
            content,
            timestamp,
            is_private,
            target_id,
        };
        self.next_id += 1;
        self.entries.push_back(entry.clone());
        Ok(entry)
    }

    /// `Ok(())` on success; `NotFound` (silently ignorable by the caller)
    /// when the message was already evicted. Only the author or a host may
    /// call this — that check belongs to the coordinator.
    pub fn remove(&mut self, id: u64) -> Result<(), HubError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| HubError::NotFound(format!("chat message {id}")))?;
        self.entries.remove(pos);
        Ok(())
    }

    pub fn entry(&self, id: u64) -> Option<&ChatEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn recent(&self) -> Vec<ChatEntry> {
        self.entries.iter().cloned().collect()
    }
}
