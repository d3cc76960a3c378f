//! Route definitions for the triage webhook.

use axum::routing::post;
use axum::Router;

use crate::handlers::triage;
use crate::state::AppState;

/// Routes mounted at `/triage`.
///
/// ```text
/// POST /assign-ticket   -> assign_ticket (bearer secret)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/assign-ticket", post(triage::assign_ticket))
}
