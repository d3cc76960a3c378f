//! Route definitions for the `/teams` resource.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::teams;
use crate::state::AppState;

/// Routes mounted at `/teams`.
///
/// ```text
/// GET    /               -> list
/// POST   /               -> create (agent)
/// GET    /{id}           -> get_by_id
/// PUT    /{id}           -> update (agent)
/// DELETE /{id}           -> delete (admin)
/// PUT    /{id}/members   -> set_members (agent)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(teams::list).post(teams::create))
        .route(
            "/{id}",
            get(teams::get_by_id)
                .put(teams::update)
                .delete(teams::delete),
        )
        .route("/{id}/members", put(teams::set_members))
}
