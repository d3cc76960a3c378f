//! Automatic triage: prompt construction and decision validation.
//!
//! The I/O (embedding, similarity search, chat completion) lives in the API
//! crate; everything here is deterministic given its inputs, except
//! [`pick_assignee`] which takes the random source as a parameter.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::template::{ASSIGNED_TO, PRIORITY};
use crate::ticket::{find_by_name, FieldSnapshot};
use crate::types::DbId;
use crate::update::FieldUpdate;

/// Name of the single tool offered to the model.
pub const TOOL_NAME: &str = "updateTicket";

pub const MIN_PRIORITY: u8 = 0;
pub const MAX_PRIORITY: u8 = 3;

/// A team returned by the similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamCandidate {
    pub id: DbId,
    pub name: String,
    pub description: String,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f64,
}

/// What the model decided for a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriageDecision {
    pub ticket_id: DbId,
    pub team_id: DbId,
    pub priority: u8,
}

/// Text embedded for a ticket.
pub fn ticket_embedding_input(title: &str, description: &str) -> String {
    format!("{title} - {description}")
}

/// Text embedded for a team.
pub fn team_document(name: &str, description: &str) -> String {
    format!("{name} - {description}")
}

pub fn system_prompt() -> &'static str {
    "You are a support agent for a company. You route incoming tickets to the \
     team best suited to handle them and assign a priority. Keep your response \
     concise and to the point."
}

/// The user message describing the ticket and the candidate teams.
pub fn user_prompt(
    ticket_id: DbId,
    title: &str,
    description: &str,
    candidates: &[TeamCandidate],
) -> String {
    let teams = candidates
        .iter()
        .map(|c| format!("{} (id: {})", team_document(&c.name, &c.description), c.id))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are given a ticket with an id, title and description:\n\
         Ticket id: {ticket_id}\n\
         Title: {title}\n\
         Description: {description}\n\n\
         Here are potential teams that can handle the ticket:\n\
         {teams}\n\n\
         Based on the ticket content, come up with a priority between {MIN_PRIORITY} and \
         {MAX_PRIORITY}, inclusive (lower is higher priority) and select the most relevant \
         team to handle it. Update the ticket with this information."
    )
}

pub fn tool_description() -> &'static str {
    "Update ticket with the given team and priority"
}

/// JSON schema of the tool arguments.
pub fn tool_parameters() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "ticketId": { "type": "string" },
            "teamId": { "type": "string" },
            "priority": { "type": "number" }
        },
        "required": ["ticketId", "teamId", "priority"],
        "additionalProperties": false
    })
}

/// Parse and validate the model's tool-call arguments.
///
/// The ticket id must match the ticket being triaged, the team must be one
/// of the offered candidates, and the priority must be within range.
pub fn parse_decision(
    arguments: &str,
    ticket_id: DbId,
    candidates: &[TeamCandidate],
) -> Result<TriageDecision, CoreError> {
    let args: Value = serde_json::from_str(arguments).map_err(|e| {
        CoreError::ExternalService(format!("Tool arguments are not valid JSON: {e}"))
    })?;

    let claimed_ticket = id_arg(&args, "ticketId")?;
    if claimed_ticket != ticket_id {
        return Err(CoreError::ExternalService(format!(
            "Model answered for ticket {claimed_ticket}, expected {ticket_id}"
        )));
    }

    let team_id = id_arg(&args, "teamId")?;
    if !candidates.iter().any(|c| c.id == team_id) {
        return Err(CoreError::ExternalService(format!(
            "Model picked team {team_id}, which was not offered"
        )));
    }

    let priority = args
        .get("priority")
        .and_then(|p| p.as_f64().or_else(|| p.as_str().and_then(|s| s.trim().parse().ok())))
        .ok_or_else(|| CoreError::ExternalService("Tool call is missing 'priority'".into()))?;
    if priority.fract() != 0.0
        || priority < f64::from(MIN_PRIORITY)
        || priority > f64::from(MAX_PRIORITY)
    {
        return Err(CoreError::ExternalService(format!(
            "Priority {priority} is outside {MIN_PRIORITY}..={MAX_PRIORITY}"
        )));
    }

    Ok(TriageDecision {
        ticket_id,
        team_id,
        priority: priority as u8,
    })
}

/// Ids may arrive as JSON numbers or numeric strings.
pub(crate) fn id_arg(args: &Value, name: &str) -> Result<DbId, CoreError> {
    let value = args
        .get(name)
        .ok_or_else(|| CoreError::ExternalService(format!("Tool call is missing '{name}'")))?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| CoreError::ExternalService(format!("'{name}' is not an id: {value}")))
}

/// Pick one team member uniformly at random.
pub fn pick_assignee<R: Rng + ?Sized>(members: &[DbId], rng: &mut R) -> Option<DbId> {
    members.choose(rng).copied()
}

/// Field updates that record the assignment on a ticket.
///
/// Returns `None` when the ticket lacks the "Assigned To" or "Priority"
/// system field.
pub fn assignment_updates(
    fields: &[FieldSnapshot],
    assignee: DbId,
    priority: u8,
) -> Option<Vec<FieldUpdate>> {
    let assigned = find_by_name(fields, ASSIGNED_TO)?;
    let prio = find_by_name(fields, PRIORITY)?;
    Some(vec![
        FieldUpdate {
            id: assigned.id,
            value: assignee.to_string(),
        },
        FieldUpdate {
            id: prio.id,
            value: priority.to_string(),
        },
    ])
}

/// The internal comment left by the triage actor.
pub fn assignment_comment(agent_name: &str, team_name: &str, priority: u8) -> String {
    format!(
        "Automatically assigned to {agent_name} from team {team_name} with priority {priority} based on ticket content"
    )
}
