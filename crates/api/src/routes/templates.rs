//! Route definitions for the `/templates` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::templates;
use crate::state::AppState;

/// Routes mounted at `/templates`.
///
/// ```text
/// GET    /                -> list
/// POST   /                -> create (agent)
/// GET    /{id}            -> get_by_id
/// DELETE /{id}            -> delete (agent, whole lineage)
/// POST   /{id}/versions   -> create_version (agent)
/// GET    /{id}/history    -> history (agent)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(templates::list).post(templates::create))
        .route(
            "/{id}",
            get(templates::get_by_id).delete(templates::delete),
        )
        .route("/{id}/versions", post(templates::create_version))
        .route("/{id}/history", get(templates::history))
}
