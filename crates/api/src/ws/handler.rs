use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use autocrm_core::types::DbId;
use autocrm_events::TicketNotification;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::engine::tickets::find_visible_ticket;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::ws::manager::WsSender;

/// Browsers cannot set headers on the upgrade request, so the access token
/// travels as `?token=`.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// Messages a client sends over the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { ticket_id: DbId },
    Unsubscribe { ticket_id: DbId },
}

/// Messages the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { ticket_id: DbId },
    Unsubscribed { ticket_id: DbId },
    /// Something changed on a watched ticket; the client re-fetches it.
    Ticket(TicketNotification),
    Error { message: String },
}

impl ServerMessage {
    fn into_frame(self) -> Option<Message> {
        match serde_json::to_string(&self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize WebSocket message");
                None
            }
        }
    }
}

/// GET /ws?token=<jwt>
///
/// Authenticates before upgrading; an invalid token is answered with 401
/// and no socket is opened.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
) -> Result<Response, AppError> {
    let auth = AuthUser::from_token(&query.token, &state.config.jwt)?;
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, auth))
        .into_response())
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Processes subscribe/unsubscribe requests on the current task; each
///      watched ticket gets its own forwarding task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState, auth: AuthUser) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, user_id = auth.user_id, "WebSocket connected");

    let mut rx = state
        .ws_manager
        .add(conn_id.clone(), auth.user_id, auth.role)
        .await;
    let Some(outbound) = state.ws_manager.sender(&conn_id).await else {
        return;
    };

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    let mut watches: HashMap<DbId, JoinHandle<()>> = HashMap::new();

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(request) => {
                        handle_request(&state, auth, &outbound, &mut watches, request).await
                    }
                    Err(e) => ServerMessage::Error {
                        message: format!("Unrecognized message: {e}"),
                    },
                };
                if let Some(frame) = reply.into_frame() {
                    let _ = outbound.send(frame);
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    for (ticket_id, watch) in watches.drain() {
        end_watch(&state, ticket_id, watch).await;
    }
    state.ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

async fn handle_request(
    state: &AppState,
    auth: AuthUser,
    outbound: &WsSender,
    watches: &mut HashMap<DbId, JoinHandle<()>>,
    request: ClientMessage,
) -> ServerMessage {
    match request {
        ClientMessage::Subscribe { ticket_id } => {
            if watches.contains_key(&ticket_id) {
                return ServerMessage::Subscribed { ticket_id };
            }
            // Same visibility rule as the REST read path.
            if let Err(e) = find_visible_ticket(&state.pool, &auth.actor(), ticket_id).await {
                return ServerMessage::Error {
                    message: e.to_string(),
                };
            }
            let receiver = state.ticket_feed.subscribe(ticket_id).await;
            let staff = auth.actor().is_staff();
            watches.insert(ticket_id, spawn_watch(receiver, outbound.clone(), staff));
            tracing::debug!(ticket_id, user_id = auth.user_id, "Ticket watch started");
            ServerMessage::Subscribed { ticket_id }
        }
        ClientMessage::Unsubscribe { ticket_id } => {
            if let Some(watch) = watches.remove(&ticket_id) {
                end_watch(state, ticket_id, watch).await;
            }
            ServerMessage::Unsubscribed { ticket_id }
        }
    }
}

/// Whether a watcher should hear about a notification. Customers are not
/// told that internal notes were written on their tickets.
fn should_deliver(notification: &TicketNotification, staff: bool) -> bool {
    staff || notification.visible_to_customers()
}

/// Forward one ticket's notifications to the connection until either side
/// goes away.
fn spawn_watch(
    mut receiver: broadcast::Receiver<TicketNotification>,
    outbound: WsSender,
    staff: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(notification) => {
                    if !should_deliver(&notification, staff) {
                        continue;
                    }
                    let Some(frame) = ServerMessage::Ticket(notification).into_frame() else {
                        continue;
                    };
                    if outbound.send(frame).is_err() {
                        break;
                    }
                }
                // Notifications carry no data, so skipping some is harmless.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Stop a watch and drop the ticket's feed entry once nobody watches it.
async fn end_watch(state: &AppState, ticket_id: DbId, watch: JoinHandle<()>) {
    watch.abort();
    // The receiver is only dropped once the aborted task has been reaped.
    let _ = watch.await;
    if state.ticket_feed.release(ticket_id).await {
        tracing::debug!(ticket_id, "Ticket feed entry released");
    }
}

#[cfg(test)]
mod tests {
    use autocrm_events::TicketSignal;

    use super::*;

    #[test]
    fn client_messages_are_tagged_by_action() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"action":"subscribe","ticket_id":12}"#).unwrap();
        assert_eq!(msg, ClientMessage::Subscribe { ticket_id: 12 });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"action":"unsubscribe","ticket_id":3}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unsubscribe { ticket_id: 3 });

        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"shout"}"#).is_err());
    }

    #[test]
    fn ticket_notifications_are_flattened_under_a_type_tag() {
        let msg = ServerMessage::Ticket(TicketNotification {
            ticket_id: 4,
            event: TicketSignal::UpdateInserted,
            internal: true,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "ticket", "ticket_id": 4, "event": "update_inserted"})
        );
    }

    #[test]
    fn internal_entries_reach_staff_watchers_only() {
        let note = TicketNotification {
            ticket_id: 4,
            event: TicketSignal::UpdateInserted,
            internal: true,
        };
        assert!(should_deliver(&note, true));
        assert!(!should_deliver(&note, false));

        let reply = TicketNotification::new(4, TicketSignal::UpdateInserted);
        assert!(should_deliver(&reply, false));
    }
}
