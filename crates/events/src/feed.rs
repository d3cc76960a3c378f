//! Realtime change feed keyed by ticket id.
//!
//! [`TicketFeed`] listens to the [`EventBus`](crate::bus::EventBus) and fans
//! out payload-less notifications to everyone watching a ticket. Watchers
//! re-read the ticket through the API; the notification only says *that*
//! something changed.

use std::collections::HashMap;

use autocrm_core::types::DbId;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::bus::{event_types, PlatformEvent, ENTITY_TICKET};

/// Per-ticket buffer. Watchers that fall behind just re-fetch.
const TICKET_CHANNEL_CAPACITY: usize = 16;

/// What happened to a watched ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketSignal {
    /// The ticket row (fields, tags) changed.
    Changed,
    /// A new entry was appended to the ticket's audit log.
    UpdateInserted,
}

/// The message delivered to watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TicketNotification {
    pub ticket_id: DbId,
    pub event: TicketSignal,
    /// Set when the inserted entry is an internal note. Never sent over the
    /// wire; watchers use it to decide who hears about the entry at all.
    #[serde(skip)]
    pub internal: bool,
}

impl TicketNotification {
    pub fn new(ticket_id: DbId, event: TicketSignal) -> Self {
        Self {
            ticket_id,
            event,
            internal: false,
        }
    }

    /// Whether a watcher who is not staff may be told about this.
    pub fn visible_to_customers(&self) -> bool {
        !self.internal
    }
}

/// Map a platform event to the ticket notification it implies, if any.
pub fn signal_for(event: &PlatformEvent) -> Option<TicketNotification> {
    let signal = match event.event_type.as_str() {
        event_types::TICKET_CHANGED => TicketSignal::Changed,
        event_types::TICKET_UPDATE_INSERTED => TicketSignal::UpdateInserted,
        _ => return None,
    };
    let internal = signal == TicketSignal::UpdateInserted
        && event.payload["internal"].as_bool().unwrap_or(false);
    Some(TicketNotification {
        ticket_id: event.source_id(ENTITY_TICKET)?,
        event: signal,
        internal,
    })
}

/// Registry of per-ticket broadcast channels.
#[derive(Default)]
pub struct TicketFeed {
    channels: RwLock<HashMap<DbId, broadcast::Sender<TicketNotification>>>,
}

impl TicketFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching a ticket. Dropping the receiver ends the watch.
    pub async fn subscribe(&self, ticket_id: DbId) -> broadcast::Receiver<TicketNotification> {
        let mut channels = self.channels.write().await;
        channels
            .entry(ticket_id)
            .or_insert_with(|| broadcast::channel(TICKET_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver a notification to the ticket's watchers.
    ///
    /// Returns the number of watchers reached. Channels whose watchers have
    /// all gone away are removed.
    pub async fn notify(&self, notification: TicketNotification) -> usize {
        let mut channels = self.channels.write().await;
        let Some(sender) = channels.get(&notification.ticket_id) else {
            return 0;
        };
        match sender.send(notification) {
            Ok(n) => n,
            Err(_) => {
                channels.remove(&notification.ticket_id);
                0
            }
        }
    }

    /// Drop the ticket's channel if nobody is watching it anymore.
    ///
    /// Called when a watch ends. Returns whether the entry was removed.
    pub async fn release(&self, ticket_id: DbId) -> bool {
        let mut channels = self.channels.write().await;
        let idle = channels
            .get(&ticket_id)
            .is_some_and(|sender| sender.receiver_count() == 0);
        if idle {
            channels.remove(&ticket_id);
        }
        idle
    }

    /// Number of tickets with at least one registered channel.
    pub async fn watched_tickets(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Forward bus events to ticket watchers until the bus closes.
    pub async fn run(&self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(notification) = signal_for(&event) {
                        let reached = self.notify(notification).await;
                        tracing::debug!(
                            ticket_id = notification.ticket_id,
                            event = ?notification.event,
                            reached,
                            "Ticket notification delivered"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Ticket feed lagged, some notifications were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, ticket feed shutting down");
                    break;
                }
            }
        }
    }
}
