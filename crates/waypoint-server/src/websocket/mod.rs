//! WebSocket subscribers: connection state, registry, fan-out and lifecycle.

pub mod broadcast;
pub mod connection;
pub mod lifecycle;
pub mod registry;

pub use broadcast::{Broadcaster, PublishReport};
pub use connection::{DeliveryError, SubscriberConnection};
pub use lifecycle::{Disconnect, SubscriberLifecycle, WriterExit};
pub use registry::ConnectionRegistry;
