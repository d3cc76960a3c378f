//! Route definitions for the `/tickets` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tickets;
use crate::state::AppState;

/// Routes mounted at `/tickets`.
///
/// ```text
/// GET  /               -> list
/// POST /               -> create
/// GET  /{id}           -> get_by_id
/// GET  /{id}/updates   -> list_updates
/// POST /{id}/updates   -> create_update
/// GET  /{id}/audit     -> audit (agent)
/// POST /{id}/assistant -> assistant (agent)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tickets::list).post(tickets::create))
        .route("/{id}", get(tickets::get_by_id))
        .route(
            "/{id}/updates",
            get(tickets::list_updates).post(tickets::create_update),
        )
        .route("/{id}/audit", get(tickets::audit))
        .route("/{id}/assistant", post(tickets::assistant))
}
