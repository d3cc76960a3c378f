use std::sync::Arc;

use autocrm_events::{EventBus, TicketFeed};

use crate::config::ServerConfig;
use crate::triage::TriageService;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: autocrm_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Centralized event bus for publishing platform events.
    pub event_bus: Arc<EventBus>,
    /// Per-ticket realtime notifications, fed from the event bus.
    pub ticket_feed: Arc<TicketFeed>,
    /// `None` when no language model is configured; the webhook then
    /// answers with an error and the worker is not started.
    pub triage: Option<Arc<TriageService>>,
}
