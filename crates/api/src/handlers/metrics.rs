//! Handlers for the `/metrics` resource.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use autocrm_core::metrics::{
    compute_agent_metrics, lookback_start, AgentMetrics, TicketActivity, UpdateActivity,
};
use autocrm_core::types::DbId;
use autocrm_core::update::AuditEntry;
use autocrm_db::repositories::{TicketRepo, TicketUpdateRepo};

use crate::error::AppResult;
use crate::middleware::rbac::RequireAgent;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/metrics/me
///
/// Dashboard figures for the calling agent over the last week, with the
/// assigned-ticket trend against the week before.
pub async fn me(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<AgentMetrics>>> {
    let now = chrono::Utc::now();
    let tickets = TicketRepo::list_created_since(&state.pool, lookback_start(now)).await?;
    let ids: Vec<DbId> = tickets.iter().map(|t| t.id).collect();

    let mut updates: HashMap<DbId, Vec<UpdateActivity>> = HashMap::new();
    for entry in TicketUpdateRepo::list_by_tickets(&state.pool, &ids).await? {
        updates
            .entry(entry.ticket_id)
            .or_default()
            .push(UpdateActivity {
                created_by: entry.created_by,
                created_at: entry.created_at,
                internal: entry.internal,
                deltas: entry.deltas().to_vec(),
            });
    }

    let activity: Vec<TicketActivity> = tickets
        .into_iter()
        .map(|t| TicketActivity {
            updates: updates.remove(&t.id).unwrap_or_default(),
            id: t.id,
            title: t.title,
            created_by: t.created_by,
            created_at: t.created_at,
            fields: t.fields.0,
        })
        .collect();

    let metrics = compute_agent_metrics(auth.user_id, &activity, now);
    tracing::debug!(
        user_id = auth.user_id,
        tickets = activity.len(),
        assigned = metrics.assigned_tickets,
        "Agent metrics computed"
    );
    Ok(Json(DataResponse { data: metrics }))
}
