//! Repository for the `tickets` table.
//!
//! `fields` is only ever written by [`TicketRepo::insert`] and by
//! [`TicketRepo::write_projection`] inside the update transaction.

use autocrm_core::template::{ASSIGNED_TO, STATUS};
use autocrm_core::ticket::FieldSnapshot;
use autocrm_core::types::{DbId, Timestamp};
use serde_json::json;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::ticket::{CreateTicket, Ticket, TicketListParams};

/// Column list for `tickets` queries.
const COLUMNS: &str = "\
    id, title, description, template_id, created_by, fields, initial_fields, tags, \
    created_at, updated_at";

/// Default page size for ticket listing.
pub const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for ticket listing.
pub const MAX_LIMIT: i64 = 200;

/// Provides ticket persistence.
pub struct TicketRepo;

impl TicketRepo {
    /// Insert a ticket. The snapshot is stored both as the current
    /// projection and as the base of the audit fold.
    pub async fn create(pool: &PgPool, input: &CreateTicket) -> Result<Ticket, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let ticket = Self::insert(&mut tx, input).await?;
        tx.commit().await?;
        Ok(ticket)
    }

    /// Insert a ticket inside a caller-owned transaction, so reference
    /// checks on the snapshot see the same data the insert commits with.
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        input: &CreateTicket,
    ) -> Result<Ticket, sqlx::Error> {
        let query = format!(
            "INSERT INTO tickets \
                (title, description, template_id, created_by, fields, initial_fields, tags) \
             VALUES ($1, $2, $3, $4, $5, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ticket>(&query)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.template_id)
            .bind(input.created_by)
            .bind(Json(&input.fields))
            .bind(&input.tags)
            .fetch_one(&mut **tx)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Ticket>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tickets WHERE id = $1");
        sqlx::query_as::<_, Ticket>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Read a ticket and hold its row lock until the transaction ends.
    ///
    /// Concurrent updates to one ticket serialize here.
    pub async fn lock_for_update(
        tx: &mut Transaction<'_, Postgres>,
        id: DbId,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tickets WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Ticket>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Write the new field projection and, when given, the new tag list.
    pub async fn write_projection(
        tx: &mut Transaction<'_, Postgres>,
        id: DbId,
        fields: &[FieldSnapshot],
        tags: Option<&[String]>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tickets SET fields = $2, tags = COALESCE($3, tags) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(Json(fields))
        .bind(tags)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// List tickets, newest first.
    ///
    /// `created_by` restricts the list to one creator (the customer view).
    /// Field filters use JSONB containment against the `fields` snapshot.
    pub async fn list(
        pool: &PgPool,
        params: &TicketListParams,
        created_by: Option<DbId>,
    ) -> Result<Vec<Ticket>, sqlx::Error> {
        let limit = autocrm_core::pagination::clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
        let offset = autocrm_core::pagination::clamp_offset(params.offset);

        let assigned = params
            .assigned_to
            .map(|id| json!([{ "name": ASSIGNED_TO, "value": id.to_string() }]));
        let status = params
            .status
            .as_ref()
            .map(|s| json!([{ "name": STATUS, "value": s }]));

        let query = format!(
            "SELECT {COLUMNS} FROM tickets \
             WHERE ($1::bigint IS NULL OR created_by = $1) \
               AND ($2::jsonb IS NULL OR fields @> $2::jsonb) \
               AND ($3::jsonb IS NULL OR fields @> $3::jsonb) \
               AND ($4::text IS NULL OR $4 = ANY(tags)) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $5 OFFSET $6"
        );
        sqlx::query_as::<_, Ticket>(&query)
            .bind(created_by)
            .bind(assigned)
            .bind(status)
            .bind(&params.tag)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Tickets created at or after `since`, oldest first.
    pub async fn list_created_since(
        pool: &PgPool,
        since: Timestamp,
    ) -> Result<Vec<Ticket>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tickets \
             WHERE created_at >= $1 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Ticket>(&query)
            .bind(since)
            .fetch_all(pool)
            .await
    }
}
