use axum::routing::get;
use axum::Router;

use crate::handlers::metrics;
use crate::state::AppState;

/// Routes mounted at `/metrics`.
///
/// ```text
/// GET /me   -> me (agent)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(metrics::me))
}
