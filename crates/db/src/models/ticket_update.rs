//! Ticket update (audit log) models.

use autocrm_core::types::{DbId, Timestamp};
use autocrm_core::update::{AuditEntry, FieldDelta};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the append-only `ticket_updates` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TicketUpdate {
    pub id: DbId,
    pub ticket_id: DbId,
    pub created_by: DbId,
    pub created_at: Timestamp,
    pub comment: Option<String>,
    pub updates: Option<Json<Vec<FieldDelta>>>,
    pub new_tags: Option<Vec<String>>,
    pub internal: bool,
}

impl AuditEntry for TicketUpdate {
    fn entry_id(&self) -> DbId {
        self.id
    }

    fn actor_id(&self) -> DbId {
        self.created_by
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn is_internal(&self) -> bool {
        self.internal
    }

    fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    fn deltas(&self) -> &[FieldDelta] {
        self.updates.as_ref().map(|u| u.0.as_slice()).unwrap_or(&[])
    }

    fn new_tags(&self) -> Option<&[String]> {
        self.new_tags.as_deref()
    }
}

/// Insert payload for one audit entry. Empty delta lists are stored as NULL.
#[derive(Debug, Clone)]
pub struct CreateTicketUpdate {
    pub ticket_id: DbId,
    pub created_by: DbId,
    pub comment: Option<String>,
    pub deltas: Vec<FieldDelta>,
    pub new_tags: Option<Vec<String>>,
    pub internal: bool,
}
