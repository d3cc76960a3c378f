//! Handlers for the `/templates` resource.
//!
//! Templates are immutable versions grouped into lineages; "editing" a
//! template creates a new version and existing tickets keep theirs.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use autocrm_core::error::CoreError;
use autocrm_core::types::DbId;
use autocrm_db::models::template::{
    CreateTemplateRequest, CreateVersionRequest, Template, TemplateDetail, TemplateListParams,
};
use autocrm_db::repositories::TemplateRepo;

use crate::engine::templates::{self, find_template};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAgent;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/templates
///
/// The newest version of every lineage. `?include_deleted=true` also lists
/// deleted lineages and is honoured for staff only.
pub async fn list(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<TemplateListParams>,
) -> AppResult<Json<DataResponse<Vec<Template>>>> {
    let include_deleted = params.include_deleted && auth.role.is_staff();
    let templates = TemplateRepo::list_latest(&state.pool, include_deleted).await?;
    Ok(Json(DataResponse { data: templates }))
}

/// POST /api/v1/templates
///
/// Creates a new lineage, or a new version when `parent_id` is given.
pub async fn create(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Json(input): Json<CreateTemplateRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<TemplateDetail>>)> {
    let actor = auth.actor();
    let detail = match input.parent_id {
        Some(parent_id) => {
            templates::create_version(
                &state.pool,
                &actor,
                parent_id,
                &input.name,
                input.description.as_deref(),
                &input.fields,
            )
            .await?
        }
        None => {
            templates::create_template(
                &state.pool,
                &actor,
                &input.name,
                input.description.as_deref(),
                &input.fields,
            )
            .await?
        }
    };
    Ok((StatusCode::CREATED, Json(DataResponse { data: detail })))
}

/// GET /api/v1/templates/{id}
///
/// Customers only receive the fields they can see.
pub async fn get_by_id(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<TemplateDetail>>> {
    let mut detail = TemplateRepo::find_detail(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Template",
            id,
        }))?;
    if !auth.role.is_staff() {
        detail.fields.retain(|f| f.visible_to_customer);
    }
    Ok(Json(DataResponse { data: detail }))
}

/// DELETE /api/v1/templates/{id}
///
/// Soft-deletes every version of the lineage.
pub async fn delete(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    templates::delete_lineage(&state.pool, &auth.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/templates/{id}/versions
pub async fn create_version(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CreateVersionRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<TemplateDetail>>)> {
    let detail = templates::create_version(
        &state.pool,
        &auth.actor(),
        id,
        &input.name,
        input.description.as_deref(),
        &input.fields,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: detail })))
}

/// GET /api/v1/templates/{id}/history
///
/// All versions of the lineage `id` belongs to, newest first.
pub async fn history(
    RequireAgent(_auth): RequireAgent,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<Template>>>> {
    let template = find_template(&state.pool, id).await?;
    let versions = TemplateRepo::list_history(&state.pool, template.lineage_id).await?;
    Ok(Json(DataResponse { data: versions }))
}
