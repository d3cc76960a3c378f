//! Handler for the triage webhook.
//!
//! The database fires this webhook when a ticket row is inserted. It is
//! authenticated with a shared bearer secret rather than a user token.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use autocrm_core::error::CoreError;
use autocrm_core::types::DbId;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Insert-webhook payload. Only the new row's id is read.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub record: WebhookRecord,
}

#[derive(Debug, Deserialize)]
pub struct WebhookRecord {
    pub id: DbId,
}

/// POST /api/v1/triage/assign-ticket
///
/// Runs triage for the ticket in the payload and answers with an empty 200.
/// Upstream model failures are logged and also answered with 200 so the
/// caller does not retry; local faults answer 500 with the error message.
pub async fn assign_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> AppResult<Response> {
    authorize_webhook(&headers, state.config.triage.webhook_secret.as_deref())?;

    let service = state.triage.clone().ok_or_else(|| {
        AppError::Core(CoreError::ExternalService(
            "Triage is not configured".into(),
        ))
    })?;

    let ticket_id = payload.record.id;
    match service.assign_ticket_within_budget(ticket_id).await {
        Ok(outcome) => {
            tracing::debug!(ticket_id, ?outcome, "Triage webhook handled");
            Ok(StatusCode::OK.into_response())
        }
        Err(e) if e.is_swallowed() => {
            tracing::warn!(ticket_id, error = %e, "Triage run abandoned");
            Ok(StatusCode::OK.into_response())
        }
        Err(e) => {
            tracing::error!(ticket_id, error = %e, "Triage run failed");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string(), "code": "TRIAGE_FAILED" })),
            )
                .into_response())
        }
    }
}

/// Check the `Authorization: Bearer <secret>` header against the configured
/// secret. Every call is rejected while no secret is configured.
fn authorize_webhook(headers: &HeaderMap, secret: Option<&str>) -> AppResult<()> {
    let unauthorized =
        || AppError::Core(CoreError::Unauthorized("Invalid webhook secret".into()));

    let Some(secret) = secret else {
        return Err(unauthorized());
    };
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(unauthorized)?;
    if presented != secret {
        return Err(unauthorized());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn matching_secret_is_accepted() {
        assert!(authorize_webhook(&headers("Bearer s3cret"), Some("s3cret")).is_ok());
    }

    #[test]
    fn wrong_or_missing_secret_is_rejected() {
        assert!(authorize_webhook(&headers("Bearer nope"), Some("s3cret")).is_err());
        assert!(authorize_webhook(&headers("s3cret"), Some("s3cret")).is_err());
        assert!(authorize_webhook(&HeaderMap::new(), Some("s3cret")).is_err());
    }

    #[test]
    fn unconfigured_secret_rejects_everything() {
        assert!(authorize_webhook(&headers("Bearer anything"), None).is_err());
    }
}
