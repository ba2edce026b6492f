pub mod chat;
pub mod coordinator;
pub mod rate_limit;
pub mod state;

pub use coordinator::{Inbound, RoomCommand, RoomHandle, spawn};
pub use state::{ClientEntry, Room, RoomSettings};
