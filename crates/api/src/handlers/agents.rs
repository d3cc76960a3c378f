//! Handlers for the `/agents` directory.

use axum::extract::State;
use axum::Json;
use autocrm_db::models::profile::AgentSummary;
use autocrm_db::repositories::ProfileRepo;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/agents
///
/// Staff that can be picked for agent-reference fields. System actors are
/// left out.
pub async fn list(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<AgentSummary>>>> {
    let agents = ProfileRepo::list_agents(&state.pool).await?;
    Ok(Json(DataResponse { data: agents }))
}
