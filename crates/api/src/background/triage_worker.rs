//! Event-driven triage.
//!
//! Listens on the event bus: every `ticket.created` event triggers a triage
//! run for the new ticket, and every `team.saved` event refreshes that
//! team's embedding. Each run executes on its own task within the configured
//! budget, so a slow model call never holds up the next event.

use std::sync::Arc;

use autocrm_core::types::DbId;
use autocrm_events::bus::{ENTITY_TEAM, ENTITY_TICKET};
use autocrm_events::{event_types, PlatformEvent};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::triage::{TriageError, TriageService};

/// Run the triage worker until `cancel` fires or the bus closes.
///
/// In-flight runs are awaited before returning.
pub async fn run(
    service: Arc<TriageService>,
    mut receiver: broadcast::Receiver<PlatformEvent>,
    cancel: CancellationToken,
) {
    tracing::info!(
        budget_secs = service.budget().as_secs(),
        "Triage worker started"
    );
    let tracker = TaskTracker::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Triage worker stopping");
                break;
            }
            received = receiver.recv() => match received {
                Ok(event) => dispatch(&service, &tracker, &event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Triage worker lagged, some tickets were not triaged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, triage worker shutting down");
                    break;
                }
            }
        }
    }

    tracker.close();
    tracker.wait().await;
}

fn dispatch(service: &Arc<TriageService>, tracker: &TaskTracker, event: &PlatformEvent) {
    match event.event_type.as_str() {
        event_types::TICKET_CREATED => {
            let Some(ticket_id) = event.source_id(ENTITY_TICKET) else {
                return;
            };
            let service = Arc::clone(service);
            tracker.spawn(async move {
                match service.assign_ticket_within_budget(ticket_id).await {
                    Ok(_) => {}
                    Err(e) => log_failure("ticket_id", ticket_id, &e),
                }
            });
        }
        event_types::TEAM_SAVED => {
            let Some(team_id) = event.source_id(ENTITY_TEAM) else {
                return;
            };
            let service = Arc::clone(service);
            tracker.spawn(async move {
                let budget = service.budget();
                let result = tokio::time::timeout(budget, service.embed_team(team_id))
                    .await
                    .unwrap_or(Err(TriageError::Timeout(budget.as_secs())));
                match result {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(team_id, "Team gone before it was embedded"),
                    Err(e) => log_failure("team_id", team_id, &e),
                }
            });
        }
        _ => {}
    }
}

fn log_failure(subject: &'static str, id: DbId, error: &TriageError) {
    if error.is_swallowed() {
        tracing::warn!(subject, id, error = %error, "Triage run abandoned");
    } else {
        tracing::error!(subject, id, error = %error, "Triage run failed");
    }
}
