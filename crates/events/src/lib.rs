//! autoCRM event bus and realtime ticket feed.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the domain event envelope.
//! - [`TicketFeed`]: per-ticket notification channels fed from the bus,
//!   consumed by WebSocket subscribers.

pub mod bus;
pub mod feed;

pub use bus::{event_types, EventBus, PlatformEvent};
pub use feed::{TicketFeed, TicketNotification, TicketSignal};
