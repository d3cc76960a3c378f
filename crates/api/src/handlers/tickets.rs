//! Handlers for the `/tickets` resource and its audit log.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use autocrm_core::error::CoreError;
use autocrm_core::projection::{project_updates, Audience, ProjectedUpdate};
use autocrm_core::types::DbId;
use autocrm_core::update::{verify_audit, AuditReport, UpdateRequest};
use autocrm_db::models::ticket::{CreateTicketRequest, TicketListParams};
use autocrm_db::repositories::{TemplateRepo, TicketRepo, TicketUpdateRepo};
use serde::{Deserialize, Serialize};

use crate::engine::tickets::{
    create_ticket, find_visible_ticket, project_tickets, update_ticket, TicketView,
};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAgent;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// GET /api/v1/tickets
///
/// Staff see every ticket and may filter by `assigned_to`, `status` and
/// `tag`; customers only ever see their own tickets.
pub async fn list(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<TicketListParams>,
) -> AppResult<Json<DataResponse<Vec<TicketView>>>> {
    let actor = auth.actor();
    let created_by = (!actor.is_staff()).then_some(actor.id);
    let tickets = TicketRepo::list(&state.pool, &params, created_by).await?;
    let views = project_tickets(&state.pool, tickets, Audience::for_actor(&actor)).await?;
    Ok(Json(DataResponse { data: views }))
}

/// POST /api/v1/tickets
pub async fn create(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateTicketRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<TicketView>>)> {
    let actor = auth.actor();
    let ticket = create_ticket(&state.pool, &state.event_bus, &actor, &input).await?;
    let template_fields = TemplateRepo::list_fields(&state.pool, ticket.template_id).await?;
    let view = TicketView::project(ticket, &template_fields, Audience::for_actor(&actor));
    Ok((StatusCode::CREATED, Json(DataResponse { data: view })))
}

/// GET /api/v1/tickets/{id}
pub async fn get_by_id(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<TicketView>>> {
    let actor = auth.actor();
    let ticket = find_visible_ticket(&state.pool, &actor, id).await?;
    let template_fields = TemplateRepo::list_fields(&state.pool, ticket.template_id).await?;
    let view = TicketView::project(ticket, &template_fields, Audience::for_actor(&actor));
    Ok(Json(DataResponse { data: view }))
}

// ---------------------------------------------------------------------------
// Updates (audit log)
// ---------------------------------------------------------------------------

/// GET /api/v1/tickets/{id}/updates
///
/// The log in fold order. Customers never see internal entries or deltas of
/// fields hidden from them.
pub async fn list_updates(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<ProjectedUpdate>>>> {
    let actor = auth.actor();
    let ticket = find_visible_ticket(&state.pool, &actor, id).await?;
    let entries = TicketUpdateRepo::list_by_ticket(&state.pool, ticket.id).await?;
    let template_fields = TemplateRepo::list_fields(&state.pool, ticket.template_id).await?;
    let updates = project_updates(&entries, &template_fields, Audience::for_actor(&actor));
    Ok(Json(DataResponse { data: updates }))
}

/// POST /api/v1/tickets/{id}/updates
///
/// Answers 201 with the new audit entry, or 204 when the request changed
/// nothing and no entry was written.
pub async fn create_update(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateRequest>,
) -> AppResult<Response> {
    let actor = auth.actor();
    let Some(entry) = update_ticket(&state.pool, &state.event_bus, id, &actor, &input).await?
    else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let ticket = TicketRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Ticket",
            id,
        }))?;
    let template_fields = TemplateRepo::list_fields(&state.pool, ticket.template_id).await?;
    let projected = project_updates(
        std::slice::from_ref(&entry),
        &template_fields,
        Audience::for_actor(&actor),
    );
    match projected.into_iter().next() {
        Some(update) => {
            Ok((StatusCode::CREATED, Json(DataResponse { data: update })).into_response())
        }
        None => Ok(StatusCode::CREATED.into_response()),
    }
}

/// GET /api/v1/tickets/{id}/audit
///
/// Replays the creation snapshot and every delta, and compares the result
/// with the stored field values.
pub async fn audit(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<AuditReport>>> {
    let ticket = TicketRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Ticket",
            id,
        }))?;
    let entries = TicketUpdateRepo::list_by_ticket(&state.pool, id).await?;
    let report = verify_audit(&ticket.initial_fields.0, &entries, &ticket.fields.0);

    if !report.consistent {
        tracing::warn!(
            ticket_id = id,
            user_id = auth.user_id,
            chain_breaks = report.chain_breaks.len(),
            mismatches = report.mismatches.len(),
            "Ticket audit log is inconsistent"
        );
    }
    Ok(Json(DataResponse { data: report }))
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AssistantRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AssistantResponse {
    pub reply: Option<String>,
    /// The audit entry written on the agent's behalf, if the model asked
    /// for a change that changed something.
    pub update: Option<ProjectedUpdate>,
}

/// POST /api/v1/tickets/{id}/assistant
///
/// Passes the agent's message and the ticket's context to the model. A tool
/// call is applied as an update by the agent. Answers 502 when no model is
/// configured or the model fails.
pub async fn assistant(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<AssistantRequest>,
) -> AppResult<Json<DataResponse<AssistantResponse>>> {
    let service = state.triage.clone().ok_or_else(|| {
        AppError::Core(CoreError::ExternalService(
            "Assistant is not configured".into(),
        ))
    })?;

    let actor = auth.actor();
    let reply = service.assist(id, &actor, &input.message).await?;

    let update = match reply.update {
        Some(entry) => {
            let ticket = find_visible_ticket(&state.pool, &actor, id).await?;
            let template_fields =
                TemplateRepo::list_fields(&state.pool, ticket.template_id).await?;
            project_updates(
                std::slice::from_ref(&entry),
                &template_fields,
                Audience::for_actor(&actor),
            )
            .into_iter()
            .next()
        }
        None => None,
    };

    Ok(Json(DataResponse {
        data: AssistantResponse {
            reply: reply.message,
            update,
        },
    }))
}
