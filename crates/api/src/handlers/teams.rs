//! Handlers for the `/teams` resource.
//!
//! Teams are what triage assigns tickets to. Saving a team's name or
//! description publishes `team.saved`, which refreshes its embedding.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use autocrm_core::error::CoreError;
use autocrm_core::roles::Role;
use autocrm_core::types::DbId;
use autocrm_db::models::team::{CreateTeam, SetTeamMembers, Team, UpdateTeam};
use autocrm_db::repositories::{ProfileRepo, TeamRepo};
use autocrm_db::DbPool;
use autocrm_events::bus::ENTITY_TEAM;
use autocrm_events::{event_types, PlatformEvent};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{RequireAdmin, RequireAgent};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/teams
pub async fn list(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Team>>>> {
    let teams = TeamRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: teams }))
}

/// GET /api/v1/teams/{id}
pub async fn get_by_id(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Team>>> {
    let team = TeamRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Team", id }))?;
    Ok(Json(DataResponse { data: team }))
}

/// POST /api/v1/teams
pub async fn create(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Json(mut input): Json<CreateTeam>,
) -> AppResult<(StatusCode, Json<DataResponse<Team>>)> {
    input.name = validate_team_name(&input.name)?;
    input.description = input.description.trim().to_string();
    ensure_staff_members(&state.pool, &input.member_ids).await?;

    let team = TeamRepo::create(&state.pool, &input).await?;
    publish_saved(&state, &team, auth.user_id);

    tracing::info!(team_id = team.id, user_id = auth.user_id, "Team created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: team })))
}

/// PUT /api/v1/teams/{id}
pub async fn update(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(mut input): Json<UpdateTeam>,
) -> AppResult<Json<DataResponse<Team>>> {
    if let Some(name) = input.name.as_deref() {
        input.name = Some(validate_team_name(name)?);
    }
    input.description = input.description.map(|d| d.trim().to_string());

    let team = TeamRepo::update(&state.pool, id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Team", id }))?;
    if input.name.is_some() || input.description.is_some() {
        publish_saved(&state, &team, auth.user_id);
    }

    tracing::info!(team_id = id, user_id = auth.user_id, "Team updated");
    Ok(Json(DataResponse { data: team }))
}

/// PUT /api/v1/teams/{id}/members
///
/// Replaces the member list.
pub async fn set_members(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<SetTeamMembers>,
) -> AppResult<Json<DataResponse<Team>>> {
    ensure_staff_members(&state.pool, &input.member_ids).await?;

    let team = TeamRepo::set_members(&state.pool, id, &input.member_ids)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Team", id }))?;

    tracing::info!(
        team_id = id,
        members = team.member_ids.len(),
        user_id = auth.user_id,
        "Team members replaced"
    );
    Ok(Json(DataResponse { data: team }))
}

/// DELETE /api/v1/teams/{id}
pub async fn delete(
    RequireAdmin(auth): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !TeamRepo::delete(&state.pool, id).await? {
        return Err(AppError::Core(CoreError::NotFound { entity: "Team", id }));
    }
    tracing::info!(team_id = id, user_id = auth.user_id, "Team deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_team_name(name: &str) -> Result<String, CoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("Team name must not be empty".into()));
    }
    Ok(name.to_string())
}

/// Team members must be existing agents or admins.
async fn ensure_staff_members(pool: &DbPool, member_ids: &[DbId]) -> AppResult<()> {
    if member_ids.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    let roles: HashMap<DbId, String> = ProfileRepo::find_roles(&mut tx, member_ids)
        .await?
        .into_iter()
        .collect();
    tx.rollback().await?;

    for id in member_ids {
        let role = roles.get(id).ok_or_else(|| {
            CoreError::Validation(format!("Profile {id} does not exist"))
        })?;
        if !Role::parse(role)?.is_staff() {
            return Err(AppError::Core(CoreError::Validation(format!(
                "Profile {id} is not an agent"
            ))));
        }
    }
    Ok(())
}

fn publish_saved(state: &AppState, team: &Team, user_id: DbId) {
    state.event_bus.publish(
        PlatformEvent::new(event_types::TEAM_SAVED)
            .with_source(ENTITY_TEAM, team.id)
            .with_actor(user_id),
    );
}
