//! The agent chat assistant.
//!
//! Uses the same model as triage. Any change the model asks for is written
//! through [`update_ticket`] as the agent who sent the message, so it is
//! validated and audited like a manual edit.

use std::collections::HashMap;

use autocrm_core::assistant::{
    parse_request, system_prompt, tool_description, tool_parameters, user_prompt, AgentRef,
    HistoryEntry, TicketBrief, TOOL_NAME,
};
use autocrm_core::error::CoreError;
use autocrm_core::roles::Actor;
use autocrm_core::types::DbId;
use autocrm_db::models::ticket_update::TicketUpdate;
use autocrm_db::repositories::{ProfileRepo, TemplateRepo, TicketRepo, TicketUpdateRepo};

use super::{ToolPrompt, TriageError, TriageService};
use crate::engine::tickets::update_ticket;

/// What the assistant said and the audit entry it wrote, if any.
#[derive(Debug)]
pub struct AssistantReply {
    pub message: Option<String>,
    pub update: Option<TicketUpdate>,
}

impl TriageService {
    /// Answer an agent's message about a ticket within the configured budget.
    pub async fn assist(
        &self,
        ticket_id: DbId,
        actor: &Actor,
        message: &str,
    ) -> Result<AssistantReply, TriageError> {
        tokio::time::timeout(self.budget(), self.assist_unbounded(ticket_id, actor, message))
            .await
            .map_err(|_| TriageError::Timeout(self.config.timeout_secs))?
    }

    async fn assist_unbounded(
        &self,
        ticket_id: DbId,
        actor: &Actor,
        message: &str,
    ) -> Result<AssistantReply, TriageError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(CoreError::Validation("Message must not be empty".into()).into());
        }

        let ticket = TicketRepo::find_by_id(&self.pool, ticket_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Ticket",
                id: ticket_id,
            })?;
        let template_fields = TemplateRepo::list_fields(&self.pool, ticket.template_id).await?;
        let agents = ProfileRepo::list_agents(&self.pool).await?;
        let entries = TicketUpdateRepo::list_by_ticket(&self.pool, ticket_id).await?;

        let mut author_ids: Vec<DbId> = entries.iter().map(|e| e.created_by).collect();
        author_ids.sort_unstable();
        author_ids.dedup();
        let authors: HashMap<DbId, String> = ProfileRepo::find_names(&self.pool, &author_ids)
            .await?
            .into_iter()
            .collect();

        let history: Vec<HistoryEntry<'_>> = entries
            .iter()
            .map(|entry| HistoryEntry {
                created_at: entry.created_at,
                author: authors
                    .get(&entry.created_by)
                    .map(String::as_str)
                    .unwrap_or("Unknown"),
                comment: entry.comment.as_deref(),
                deltas: entry.updates.as_ref().map(|d| d.0.as_slice()).unwrap_or_default(),
                internal: entry.internal,
            })
            .collect();
        let agent_refs: Vec<AgentRef<'_>> = agents
            .iter()
            .map(|a| AgentRef {
                id: a.id,
                name: &a.name,
                email: &a.email,
            })
            .collect();
        let brief = TicketBrief {
            id: ticket.id,
            title: &ticket.title,
            description: &ticket.description,
            tags: &ticket.tags,
            fields: &ticket.fields.0,
            template_fields: &template_fields,
        };

        let prompt = ToolPrompt {
            system: system_prompt().to_string(),
            user: user_prompt(&brief, &agent_refs, &history, message),
            tool_name: TOOL_NAME.to_string(),
            tool_description: tool_description().to_string(),
            parameters: tool_parameters(),
        };
        let reply = self.model.chat(&prompt).await?;

        let update = match reply.tool_arguments.as_deref() {
            Some(arguments) => {
                let request = parse_request(arguments, ticket_id)?;
                update_ticket(&self.pool, &self.event_bus, ticket_id, actor, &request).await?
            }
            None => None,
        };

        tracing::info!(
            ticket_id,
            user_id = actor.id,
            tool_called = reply.tool_arguments.is_some(),
            update_id = update.as_ref().map(|u| u.id),
            "Assistant answered"
        );
        Ok(AssistantReply {
            message: reply.content,
            update,
        })
    }
}
