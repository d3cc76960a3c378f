//! Repository for the append-only `ticket_updates` table.
//!
//! There is no update or delete here; the table rejects both at the
//! database level.

use autocrm_core::types::DbId;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::ticket_update::{CreateTicketUpdate, TicketUpdate};

/// Column list for `ticket_updates` queries.
const COLUMNS: &str = "id, ticket_id, created_by, created_at, comment, updates, new_tags, internal";

pub struct TicketUpdateRepo;

impl TicketUpdateRepo {
    /// Append one audit entry inside the update transaction.
    ///
    /// `created_at` defaults to `clock_timestamp()`, so entries written under
    /// the ticket's row lock are ordered the same way the locks were taken.
    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        input: &CreateTicketUpdate,
    ) -> Result<TicketUpdate, sqlx::Error> {
        let deltas = (!input.deltas.is_empty()).then(|| Json(&input.deltas));
        let query = format!(
            "INSERT INTO ticket_updates \
                (ticket_id, created_by, comment, updates, new_tags, internal) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TicketUpdate>(&query)
            .bind(input.ticket_id)
            .bind(input.created_by)
            .bind(&input.comment)
            .bind(deltas)
            .bind(&input.new_tags)
            .bind(input.internal)
            .fetch_one(&mut **tx)
            .await
    }

    /// All entries of one ticket in fold order.
    pub async fn list_by_ticket(
        pool: &PgPool,
        ticket_id: DbId,
    ) -> Result<Vec<TicketUpdate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ticket_updates \
             WHERE ticket_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, TicketUpdate>(&query)
            .bind(ticket_id)
            .fetch_all(pool)
            .await
    }

    /// Entries of several tickets, grouped by ticket and in fold order.
    pub async fn list_by_tickets(
        pool: &PgPool,
        ticket_ids: &[DbId],
    ) -> Result<Vec<TicketUpdate>, sqlx::Error> {
        if ticket_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {COLUMNS} FROM ticket_updates \
             WHERE ticket_id = ANY($1) \
             ORDER BY ticket_id ASC, created_at ASC, id ASC"
        );
        sqlx::query_as::<_, TicketUpdate>(&query)
            .bind(ticket_ids)
            .fetch_all(pool)
            .await
    }
}
