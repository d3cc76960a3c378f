//! The triage run and team embedding upkeep.

use std::sync::Arc;
use std::time::Duration;

use autocrm_core::error::CoreError;
use autocrm_core::roles::{Actor, Role};
use autocrm_core::triage::{
    assignment_comment, assignment_updates, parse_decision, pick_assignee, system_prompt,
    team_document, ticket_embedding_input, tool_description, tool_parameters, user_prompt,
    TeamCandidate, TOOL_NAME,
};
use autocrm_core::types::DbId;
use autocrm_core::update::UpdateRequest;
use autocrm_db::repositories::{ProfileRepo, TeamRepo, TicketRepo};
use autocrm_db::DbPool;
use autocrm_events::EventBus;

use super::openai::OpenAiClient;
use super::{Embedder, LanguageModel, ToolPrompt, TriageConfig, TriageError};
use crate::engine::tickets::update_ticket;

/// How a triage run ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriageOutcome {
    Assigned {
        team_id: DbId,
        assignee_id: DbId,
        priority: u8,
    },
    /// Nothing was written. The reason is for logs only.
    Skipped { reason: &'static str },
}

/// Runs triage for tickets and keeps team embeddings current.
pub struct TriageService {
    pub(super) pool: DbPool,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) model: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    pub(super) config: TriageConfig,
}

impl TriageService {
    pub fn new(
        pool: DbPool,
        event_bus: Arc<EventBus>,
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        config: TriageConfig,
    ) -> Self {
        Self {
            pool,
            event_bus,
            model,
            embedder,
            config,
        }
    }

    /// Build the service backed by the OpenAI-compatible client.
    ///
    /// Returns `None` when no API key is configured.
    pub fn from_config(
        pool: DbPool,
        event_bus: Arc<EventBus>,
        config: &TriageConfig,
    ) -> Option<Self> {
        let client = Arc::new(OpenAiClient::from_config(config)?);
        Some(Self::new(
            pool,
            event_bus,
            client.clone(),
            client,
            config.clone(),
        ))
    }

    /// The execution budget for one run.
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Triage one ticket within the configured budget.
    pub async fn assign_ticket_within_budget(
        &self,
        ticket_id: DbId,
    ) -> Result<TriageOutcome, TriageError> {
        tokio::time::timeout(self.budget(), self.assign_ticket(ticket_id))
            .await
            .map_err(|_| TriageError::Timeout(self.config.timeout_secs))?
    }

    /// Pick a team and priority for a ticket and assign one team member.
    ///
    /// The write goes through [`update_ticket`] as an internal update by the
    /// triage bot, so it is audited like any other change.
    pub async fn assign_ticket(&self, ticket_id: DbId) -> Result<TriageOutcome, TriageError> {
        let ticket = TicketRepo::find_by_id(&self.pool, ticket_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Ticket",
                id: ticket_id,
            })?;

        if assignment_updates(&ticket.fields.0, 0, 0).is_none() {
            return Ok(skipped(ticket_id, "ticket has no Assigned To or Priority field"));
        }

        let embedding = self
            .embedder
            .embed(&ticket_embedding_input(&ticket.title, &ticket.description))
            .await?;
        let candidates: Vec<TeamCandidate> =
            TeamRepo::search_similar(&self.pool, &embedding, self.config.candidate_teams)
                .await?
                .into_iter()
                .map(TeamCandidate::from)
                .collect();
        if candidates.is_empty() {
            return Ok(skipped(ticket_id, "no team embeddings to match against"));
        }

        let prompt = ToolPrompt {
            system: system_prompt().to_string(),
            user: user_prompt(ticket_id, &ticket.title, &ticket.description, &candidates),
            tool_name: TOOL_NAME.to_string(),
            tool_description: tool_description().to_string(),
            parameters: tool_parameters(),
        };
        let Some(arguments) = self.model.invoke_tool(&prompt).await? else {
            return Ok(skipped(ticket_id, "model answered without calling the tool"));
        };
        let decision = parse_decision(&arguments, ticket_id, &candidates)?;

        let members = TeamRepo::list_member_ids(&self.pool, decision.team_id).await?;
        let picked = pick_assignee(&members, &mut rand::rng());
        let Some(assignee_id) = picked else {
            return Ok(skipped(ticket_id, "chosen team has no members"));
        };

        let bot = ProfileRepo::find_by_email(&self.pool, &self.config.bot_email)
            .await?
            .ok_or_else(|| {
                CoreError::Internal(format!(
                    "Triage bot profile '{}' does not exist",
                    self.config.bot_email
                ))
            })?;
        let assignee = ProfileRepo::find_by_id(&self.pool, assignee_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Profile",
                id: assignee_id,
            })?;
        let team_name = candidates
            .iter()
            .find(|c| c.id == decision.team_id)
            .map(|c| c.name.as_str())
            .unwrap_or_default();

        let Some(field_updates) =
            assignment_updates(&ticket.fields.0, assignee_id, decision.priority)
        else {
            return Ok(skipped(ticket_id, "ticket has no Assigned To or Priority field"));
        };
        let request = UpdateRequest {
            field_updates,
            comment: Some(assignment_comment(
                &assignee.name,
                team_name,
                decision.priority,
            )),
            internal: true,
            new_tags: None,
        };
        update_ticket(
            &self.pool,
            &self.event_bus,
            ticket_id,
            &Actor::new(bot.id, Role::Agent),
            &request,
        )
        .await?;

        tracing::info!(
            ticket_id,
            team_id = decision.team_id,
            assignee_id,
            priority = decision.priority,
            "Ticket triaged"
        );
        Ok(TriageOutcome::Assigned {
            team_id: decision.team_id,
            assignee_id,
            priority: decision.priority,
        })
    }

    /// Embed a team's `"{name} - {description}"` document and store it.
    ///
    /// Returns `false` when the team no longer exists.
    pub async fn embed_team(&self, team_id: DbId) -> Result<bool, TriageError> {
        let Some(team) = TeamRepo::find_by_id(&self.pool, team_id).await? else {
            return Ok(false);
        };
        let content = team_document(&team.name, &team.description);
        let embedding = self.embedder.embed(&content).await?;
        TeamRepo::upsert_embedding(&self.pool, team.id, &content, &embedding).await?;

        tracing::info!(team_id, dimensions = embedding.len(), "Team embedding stored");
        Ok(true)
    }
}

fn skipped(ticket_id: DbId, reason: &'static str) -> TriageOutcome {
    tracing::info!(ticket_id, reason, "Triage skipped");
    TriageOutcome::Skipped { reason }
}
