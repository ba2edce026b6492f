pub mod events;
pub mod frame;

pub use events::{AdminActionKind, ChatEntry, MediaKind, ParticipantView, ProtocolEvent, Role, SignalKind};
pub use frame::{decode_frame, encode_frame};
