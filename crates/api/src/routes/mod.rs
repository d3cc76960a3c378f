pub mod agents;
pub mod articles;
pub mod auth;
pub mod health;
pub mod metrics;
pub mod teams;
pub mod templates;
pub mod tickets;
pub mod triage;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws?token=...                                    WebSocket ticket feed
///
/// /auth/signup                                     signup (public)
/// /auth/login                                      login (public)
/// /auth/me                                         current profile
///
/// /agents                                          agent directory
///
/// /templates                                       list, create (agent)
/// /templates/{id}                                  get, delete lineage (agent)
/// /templates/{id}/versions                         create version (agent)
/// /templates/{id}/history                          lineage versions (agent)
///
/// /tickets                                         list, create
/// /tickets/{id}                                    get
/// /tickets/{id}/updates                            list, append
/// /tickets/{id}/audit                              replay check (agent)
/// /tickets/{id}/assistant                          chat assistant (agent)
///
/// /teams                                           list, create (agent)
/// /teams/{id}                                      get, update (agent), delete (admin)
/// /teams/{id}/members                              replace members (agent)
///
/// /articles                                        list, create (agent)
/// /articles/{id}                                   get, update, delete (agent)
///
/// /metrics/me                                      agent dashboard (agent)
///
/// /triage/assign-ticket                            insert webhook (bearer secret)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Realtime ticket feed.
        .route("/ws", get(ws::ws_handler))
        // Identity.
        .nest("/auth", auth::router())
        .nest("/agents", agents::router())
        // Template lineages and versions.
        .nest("/templates", templates::router())
        // Tickets and their audit log.
        .nest("/tickets", tickets::router())
        // Teams (triage targets).
        .nest("/teams", teams::router())
        // Knowledge base.
        .nest("/articles", articles::router())
        .nest("/metrics", metrics::router())
        // Automatic triage webhook.
        .nest("/triage", triage::router())
}
