pub mod outbound;
pub mod session;

pub use outbound::Outbound;
pub use session::run;
