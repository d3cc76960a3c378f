//! Ticket models.

use autocrm_core::ticket::FieldSnapshot;
use autocrm_core::types::{DbId, Timestamp};
use autocrm_core::update::FieldUpdate;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `tickets` table.
///
/// `fields` is the cached projection maintained by the update transaction;
/// `initial_fields` is the creation snapshot the audit log folds over.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Ticket {
    pub id: DbId,
    pub title: String,
    pub description: String,
    pub template_id: DbId,
    pub created_by: DbId,
    pub fields: Json<Vec<FieldSnapshot>>,
    #[serde(skip_serializing)]
    pub initial_fields: Json<Vec<FieldSnapshot>>,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Insert payload for a validated ticket.
#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub title: String,
    pub description: String,
    pub template_id: DbId,
    pub created_by: DbId,
    pub fields: Vec<FieldSnapshot>,
    pub tags: Vec<String>,
}

/// Request body for `POST /tickets`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketRequest {
    pub template_id: DbId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldUpdate>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Query parameters for `GET /tickets`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketListParams {
    /// Agent profile id stored in "Assigned To".
    pub assigned_to: Option<DbId>,
    pub status: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
