//! WebSocket infrastructure for realtime ticket updates.
//!
//! Provides connection management, heartbeat monitoring, and the HTTP
//! upgrade handler through which clients watch individual tickets.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::{ws_handler, ClientMessage, ServerMessage};
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
