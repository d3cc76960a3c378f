//! Ticket creation and the audited update transaction.
//!
//! [`update_ticket`] is the only write path for ticket field values: it locks
//! the ticket row, plans the change, writes the new projection and appends
//! exactly one audit entry, all in one transaction. Events are published
//! after commit.

use std::collections::HashMap;

use autocrm_core::error::CoreError;
use autocrm_core::field::{FieldType, FieldValue};
use autocrm_core::projection::{project_fields, Audience, ProjectedField};
use autocrm_core::roles::{Actor, Role};
use autocrm_core::template::TemplateField;
use autocrm_core::ticket::{build_initial_fields, normalize_tags, validate_title};
use autocrm_core::types::{DbId, Timestamp};
use autocrm_core::update::{plan_update, TicketState, UpdateRequest};
use autocrm_db::models::ticket::{CreateTicket, CreateTicketRequest, Ticket};
use autocrm_db::models::ticket_update::{CreateTicketUpdate, TicketUpdate};
use autocrm_db::repositories::{ProfileRepo, TemplateRepo, TicketRepo, TicketUpdateRepo};
use autocrm_db::DbPool;
use autocrm_events::bus::ENTITY_TICKET;
use autocrm_events::{event_types, EventBus, PlatformEvent};
use serde::Serialize;
use sqlx::{Postgres, Transaction};

use crate::engine::templates::find_template;
use crate::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// Read views
// ---------------------------------------------------------------------------

/// A ticket as returned to one audience, with its fields projected.
#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    pub id: DbId,
    pub title: String,
    pub description: String,
    pub template_id: DbId,
    pub created_by: DbId,
    pub fields: Vec<ProjectedField>,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TicketView {
    pub fn project(ticket: Ticket, template_fields: &[TemplateField], audience: Audience) -> Self {
        let fields = project_fields(&ticket.fields.0, template_fields, audience);
        TicketView {
            id: ticket.id,
            title: ticket.title,
            description: ticket.description,
            template_id: ticket.template_id,
            created_by: ticket.created_by,
            fields,
            tags: ticket.tags,
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
        }
    }
}

/// Load a ticket the actor is allowed to read.
///
/// Customers get `NotFound` for tickets they did not create, so ticket ids
/// of other customers are not disclosed.
pub async fn find_visible_ticket(pool: &DbPool, actor: &Actor, id: DbId) -> AppResult<Ticket> {
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "Ticket",
            id,
        })
    };
    let ticket = TicketRepo::find_by_id(pool, id).await?.ok_or_else(not_found)?;
    if !actor.is_staff() && ticket.created_by != actor.id {
        return Err(not_found());
    }
    Ok(ticket)
}

/// Project a page of tickets, loading each template version's fields once.
pub async fn project_tickets(
    pool: &DbPool,
    tickets: Vec<Ticket>,
    audience: Audience,
) -> AppResult<Vec<TicketView>> {
    let mut definitions: HashMap<DbId, Vec<TemplateField>> = HashMap::new();
    let mut views = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        if !definitions.contains_key(&ticket.template_id) {
            let fields = TemplateRepo::list_fields(pool, ticket.template_id).await?;
            definitions.insert(ticket.template_id, fields);
        }
        let fields = definitions
            .get(&ticket.template_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        views.push(TicketView::project(ticket, fields, audience));
    }
    Ok(views)
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Create a ticket from a template version.
///
/// The snapshot covers every field of the version in rank order and is stored
/// both as the current projection and as the base of the audit fold.
/// Publishes `ticket.created` after commit, which drives triage.
pub async fn create_ticket(
    pool: &DbPool,
    event_bus: &EventBus,
    actor: &Actor,
    input: &CreateTicketRequest,
) -> AppResult<Ticket> {
    let template = find_template(pool, input.template_id).await?;
    if template.is_deleted() {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Template {} has been deleted",
            template.id
        ))));
    }

    let title = validate_title(&input.title)?;
    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    let tags = normalize_tags(&input.tags);
    if !actor.is_staff() && !tags.is_empty() {
        return Err(AppError::Core(CoreError::Forbidden(
            "Customers cannot set tags".into(),
        )));
    }

    let template_fields = TemplateRepo::list_fields(pool, template.id).await?;
    let snapshot = build_initial_fields(&template_fields, &input.fields, actor)?;

    let mut tx = pool.begin().await?;
    check_references(
        &mut tx,
        snapshot
            .iter()
            .map(|f| (f.name.as_str(), f.field_type, f.value.as_str())),
    )
    .await?;
    let ticket = TicketRepo::insert(
        &mut tx,
        &CreateTicket {
            title,
            description,
            template_id: template.id,
            created_by: actor.id,
            fields: snapshot,
            tags,
        },
    )
    .await?;
    tx.commit().await?;

    event_bus.publish(
        PlatformEvent::new(event_types::TICKET_CREATED)
            .with_source(ENTITY_TICKET, ticket.id)
            .with_actor(actor.id)
            .with_payload(serde_json::json!({ "template_id": ticket.template_id })),
    );

    tracing::info!(
        ticket_id = ticket.id,
        template_id = ticket.template_id,
        user_id = actor.id,
        "Ticket created"
    );
    Ok(ticket)
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Apply an update to a ticket and append its audit entry.
///
/// Returns `Ok(None)` when the request changes nothing: no row is written
/// and no event is published. Concurrent updates serialize on the ticket row
/// lock, so the later one computes its deltas against the earlier one's
/// result (last write wins per field, and the log stays a consistent chain).
/// Every read happens on the transaction's connection, so an update never
/// needs more than one pooled connection.
pub async fn update_ticket(
    pool: &DbPool,
    event_bus: &EventBus,
    ticket_id: DbId,
    actor: &Actor,
    request: &UpdateRequest,
) -> AppResult<Option<TicketUpdate>> {
    let mut tx = pool.begin().await?;

    let ticket = TicketRepo::lock_for_update(&mut tx, ticket_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Ticket",
            id: ticket_id,
        }))?;
    let template_fields = TemplateRepo::list_fields_tx(&mut tx, ticket.template_id).await?;

    let state = TicketState {
        creator_id: ticket.created_by,
        fields: &ticket.fields.0,
        tags: &ticket.tags,
        template_fields: &template_fields,
    };
    let Some(planned) = plan_update(&state, actor, request)? else {
        tracing::debug!(ticket_id, user_id = actor.id, "Ticket update was a no-op");
        return Ok(None);
    };

    check_references(
        &mut tx,
        planned
            .deltas
            .iter()
            .map(|d| (d.field.as_str(), d.field_type, d.new_value.as_str())),
    )
    .await?;

    let changes_ticket = planned.changes_ticket();
    if changes_ticket {
        TicketRepo::write_projection(
            &mut tx,
            ticket_id,
            &planned.fields,
            planned.new_tags.as_deref(),
        )
        .await?;
    }

    let delta_count = planned.deltas.len();
    let entry = TicketUpdateRepo::create(
        &mut tx,
        &CreateTicketUpdate {
            ticket_id,
            created_by: actor.id,
            comment: planned.comment,
            deltas: planned.deltas,
            new_tags: planned.new_tags,
            internal: planned.internal,
        },
    )
    .await?;

    tx.commit().await?;

    if changes_ticket {
        event_bus.publish(
            PlatformEvent::new(event_types::TICKET_CHANGED)
                .with_source(ENTITY_TICKET, ticket_id)
                .with_actor(actor.id),
        );
    }
    event_bus.publish(
        PlatformEvent::new(event_types::TICKET_UPDATE_INSERTED)
            .with_source(ENTITY_TICKET, ticket_id)
            .with_actor(actor.id)
            .with_payload(serde_json::json!({
                "update_id": entry.id,
                "internal": entry.internal,
            })),
    );

    tracing::info!(
        ticket_id,
        update_id = entry.id,
        user_id = actor.id,
        deltas = delta_count,
        internal = entry.internal,
        "Ticket updated"
    );
    Ok(Some(entry))
}

/// Check that reference field values name existing profiles of the right
/// kind: agent fields take agents or admins, customer fields take customers.
async fn check_references<'a>(
    tx: &mut Transaction<'_, Postgres>,
    values: impl Iterator<Item = (&'a str, FieldType, &'a str)>,
) -> AppResult<()> {
    let mut references = Vec::new();
    for (name, field_type, raw) in values {
        if !field_type.is_reference() {
            continue;
        }
        if let Some(id) = FieldValue::parse(field_type, raw)?.and_then(|v| v.as_reference()) {
            references.push((name, field_type, id));
        }
    }
    if references.is_empty() {
        return Ok(());
    }

    let ids: Vec<DbId> = references.iter().map(|(_, _, id)| *id).collect();
    let roles: HashMap<DbId, String> = ProfileRepo::find_roles(tx, &ids)
        .await?
        .into_iter()
        .collect();

    for (name, field_type, id) in references {
        let role = roles.get(&id).ok_or_else(|| {
            CoreError::Validation(format!("Field '{name}': profile {id} does not exist"))
        })?;
        let role = Role::parse(role)?;
        let accepted = match field_type {
            FieldType::Agent => role.is_staff(),
            _ => role == Role::Customer,
        };
        if !accepted {
            return Err(AppError::Core(CoreError::Validation(format!(
                "Field '{name}': profile {id} is not a {field_type}"
            ))));
        }
    }
    Ok(())
}
