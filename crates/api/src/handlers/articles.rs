//! Handlers for the `/articles` knowledge base.
//!
//! Every signed-in user can read articles. Agents write and delete them.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use autocrm_core::article::{validate_content, validate_title};
use autocrm_core::error::CoreError;
use autocrm_core::types::DbId;
use autocrm_db::models::article::{Article, CreateArticle, UpdateArticle};
use autocrm_db::repositories::ArticleRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAgent;
use crate::response::DataResponse;
use crate::state::AppState;

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Article",
        id,
    })
}

/// GET /api/v1/articles
///
/// Newest first.
pub async fn list(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Article>>>> {
    let articles = ArticleRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: articles }))
}

/// GET /api/v1/articles/{id}
pub async fn get_by_id(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Article>>> {
    let article = ArticleRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: article }))
}

/// POST /api/v1/articles
pub async fn create(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Json(input): Json<CreateArticle>,
) -> AppResult<(StatusCode, Json<DataResponse<Article>>)> {
    let input = CreateArticle {
        title: validate_title(&input.title)?,
        content: validate_content(&input.content)?,
    };
    let article = ArticleRepo::create(&state.pool, &input, auth.user_id).await?;

    tracing::info!(article_id = article.id, user_id = auth.user_id, "Article created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: article })))
}

/// PUT /api/v1/articles/{id}
pub async fn update(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateArticle>,
) -> AppResult<Json<DataResponse<Article>>> {
    let input = UpdateArticle {
        title: input.title.as_deref().map(validate_title).transpose()?,
        content: input.content.as_deref().map(validate_content).transpose()?,
    };
    let article = ArticleRepo::update(&state.pool, id, &input, auth.user_id)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(article_id = id, user_id = auth.user_id, "Article updated");
    Ok(Json(DataResponse { data: article }))
}

/// DELETE /api/v1/articles/{id}
pub async fn delete(
    RequireAgent(auth): RequireAgent,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !ArticleRepo::delete(&state.pool, id).await? {
        return Err(not_found(id));
    }
    tracing::info!(article_id = id, user_id = auth.user_id, "Article deleted");
    Ok(StatusCode::NO_CONTENT)
}
