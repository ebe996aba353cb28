//! Realtime dashboard feed: event fan-out and the `/ws` endpoint.

pub mod events;
pub mod methods;
pub mod protocol;
pub mod server;

pub use events::EventBroadcaster;
pub use protocol::GatewayEvent;
