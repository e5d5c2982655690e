pub mod handlers;
pub mod message_types;
pub mod registry;
pub mod router;

pub use registry::ConnectionId;
pub use router::ChatRelay;
