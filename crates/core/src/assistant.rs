//! Agent chat assistant: prompt construction and tool-call parsing.
//!
//! An agent sends a free-form message about one ticket. The model sees the
//! ticket, its fields with their allowed values, the agents it may assign
//! and the full update history, and may answer with a single `updateTicket`
//! call. That call becomes an ordinary [`UpdateRequest`] issued by the agent.

use serde_json::Value;

use crate::error::CoreError;
use crate::field::FieldType;
use crate::template::TemplateField;
use crate::ticket::FieldSnapshot;
use crate::triage::id_arg;
use crate::types::{DbId, Timestamp};
use crate::update::{FieldDelta, FieldUpdate, UpdateRequest};

/// Name of the tool offered to the model.
pub const TOOL_NAME: &str = "updateTicket";

/// The ticket as the assistant sees it.
#[derive(Debug, Clone, Copy)]
pub struct TicketBrief<'a> {
    pub id: DbId,
    pub title: &'a str,
    pub description: &'a str,
    pub tags: &'a [String],
    pub fields: &'a [FieldSnapshot],
    /// Definitions of the ticket's template version, for types and choices.
    pub template_fields: &'a [TemplateField],
}

/// An agent the model may assign.
#[derive(Debug, Clone, Copy)]
pub struct AgentRef<'a> {
    pub id: DbId,
    pub name: &'a str,
    pub email: &'a str,
}

/// One audit entry, with its author resolved to a display name.
#[derive(Debug, Clone, Copy)]
pub struct HistoryEntry<'a> {
    pub created_at: Timestamp,
    pub author: &'a str,
    pub comment: Option<&'a str>,
    pub deltas: &'a [FieldDelta],
    pub internal: bool,
}

pub fn system_prompt() -> &'static str {
    "You are an assistant for a support agent at a company. Your job is to answer \
     questions about the ticket and make updates to it as requested. If the agent asks \
     for multiple updates, make all of them in one call. By default, all updates should \
     be internal unless otherwise specified. Do not leave a comment unless otherwise \
     specified. Respond to the agent concisely and to the point."
}

/// The user message: ticket, fields, agents, history, then the agent's
/// own message.
pub fn user_prompt(
    ticket: &TicketBrief<'_>,
    agents: &[AgentRef<'_>],
    history: &[HistoryEntry<'_>],
    message: &str,
) -> String {
    let fields = ticket
        .fields
        .iter()
        .map(|field| describe_field(field, ticket.template_fields))
        .collect::<Vec<_>>()
        .join("\n\n");

    let agents = agents
        .iter()
        .map(|a| {
            let label = if a.name.trim().is_empty() { a.email } else { a.name };
            format!("- {label} (id: {})", a.id)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let history = if history.is_empty() {
        "No updates yet.".to_string()
    } else {
        history.iter().map(describe_entry).collect::<Vec<_>>().join("\n\n")
    };

    format!(
        "You are given a ticket with an id, title, description and tags:\n\
         Ticket id: {id}\n\
         Title: {title}\n\
         Description: {description}\n\
         Tags: {tags}\n\n\
         The ticket has the following fields:\n\
         {fields}\n\n\
         Available agents:\n\
         {agents}\n\
         When updating a field with an agent type, use the agent's id.\n\n\
         Ticket update history:\n\
         {history}\n\n\
         You are chatting directly with the support agent and they have sent you the \
         following message:\n\
         {message}",
        id = ticket.id,
        title = ticket.title,
        description = ticket.description,
        tags = ticket.tags.join(", "),
    )
}

fn describe_field(field: &FieldSnapshot, template_fields: &[TemplateField]) -> String {
    let mut lines = vec![
        format!("{} (field id: {})", field.name, field.id),
        format!("Current value: {}", field.value),
        format!("Type: {}", field.field_type),
    ];
    let choices = template_fields
        .iter()
        .find(|t| t.id == field.id)
        .map(|t| t.choices.as_slice())
        .unwrap_or_default();
    if field.field_type == FieldType::Select && !choices.is_empty() {
        lines.push(format!("Allowed values: {}", choices.join(", ")));
    }
    lines.join("\n")
}

fn describe_entry(entry: &HistoryEntry<'_>) -> String {
    let mut lines = vec![
        format!("Time: {}", entry.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
        format!("By: {}", entry.author),
    ];
    if let Some(comment) = entry.comment {
        lines.push(format!("Comment: {comment}"));
    }
    for delta in entry.deltas {
        lines.push(format!(
            "Changed {}: '{}' -> '{}'",
            delta.field, delta.old_value, delta.new_value
        ));
    }
    lines.push(format!("Internal: {}", entry.internal));
    lines.join("\n")
}

pub fn tool_description() -> &'static str {
    "Update ticket with the given fields and tags."
}

/// JSON schema of the tool arguments.
pub fn tool_parameters() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "ticketId": { "type": "string" },
            "fields": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "newValue": { "type": "string" }
                    },
                    "required": ["id", "newValue"]
                }
            },
            "comment": { "type": "string" },
            "internal": { "type": "boolean" },
            "tags": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["ticketId", "fields"]
    })
}

/// Turn the model's tool-call arguments into an update request.
///
/// `internal` defaults to `true`. A blank comment counts as no comment, and
/// `tags`, when present, replaces the ticket's tag set.
pub fn parse_request(arguments: &str, ticket_id: DbId) -> Result<UpdateRequest, CoreError> {
    let args: Value = serde_json::from_str(arguments).map_err(|e| {
        CoreError::ExternalService(format!("Tool arguments are not valid JSON: {e}"))
    })?;

    let claimed = id_arg(&args, "ticketId")?;
    if claimed != ticket_id {
        return Err(CoreError::ExternalService(format!(
            "Model answered for ticket {claimed}, expected {ticket_id}"
        )));
    }

    let field_updates = match args.get("fields") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                let value = item
                    .get("newValue")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        CoreError::ExternalService("Field update is missing 'newValue'".into())
                    })?;
                Ok(FieldUpdate {
                    id: id_arg(item, "id")?,
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?,
        Some(other) => {
            return Err(CoreError::ExternalService(format!(
                "'fields' is not a list: {other}"
            )))
        }
    };

    let comment = args
        .get("comment")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let internal = args.get("internal").and_then(Value::as_bool).unwrap_or(true);
    let new_tags = match args.get("tags") {
        None | Some(Value::Null) => None,
        Some(tags) => Some(serde_json::from_value::<Vec<String>>(tags.clone()).map_err(|e| {
            CoreError::ExternalService(format!("'tags' is not a list of strings: {e}"))
        })?),
    };

    Ok(UpdateRequest {
        field_updates,
        comment,
        internal,
        new_tags,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    fn template_field(id: DbId, name: &str, field_type: FieldType, choices: &[&str]) -> TemplateField {
        TemplateField {
            id,
            template_id: 1,
            key: Uuid::new_v4(),
            name: name.into(),
            field_type,
            description: None,
            required: false,
            rank: id as i32,
            default_value: None,
            choices: choices.iter().map(|c| c.to_string()).collect(),
            is_default: false,
            visible_to_customer: false,
            editable_by_customer: false,
        }
    }

    fn snapshot(id: DbId, name: &str, field_type: FieldType, value: &str) -> FieldSnapshot {
        FieldSnapshot {
            id,
            name: name.into(),
            field_type,
            value: value.into(),
        }
    }

    #[test]
    fn prompt_lists_fields_choices_agents_and_history() {
        let template_fields = vec![
            template_field(1, "Status", FieldType::Select, &["New", "Resolved"]),
            template_field(2, "Assigned To", FieldType::Agent, &[]),
        ];
        let fields = vec![
            snapshot(1, "Status", FieldType::Select, "New"),
            snapshot(2, "Assigned To", FieldType::Agent, ""),
        ];
        let tags = vec!["billing".to_string(), "refund".to_string()];
        let ticket = TicketBrief {
            id: 42,
            title: "Refund request",
            description: "Charged twice",
            tags: &tags,
            fields: &fields,
            template_fields: &template_fields,
        };
        let agents = [
            AgentRef { id: 7, name: "Dana", email: "dana@example.com" },
            AgentRef { id: 8, name: "", email: "lee@example.com" },
        ];
        let deltas = vec![FieldDelta {
            id: 1,
            field: "Status".into(),
            field_type: FieldType::Select,
            old_value: "New".into(),
            new_value: "In Progress".into(),
        }];
        let history = [HistoryEntry {
            created_at: chrono::Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap(),
            author: "Dana",
            comment: Some("Looking into it"),
            deltas: &deltas,
            internal: true,
        }];

        let prompt = user_prompt(&ticket, &agents, &history, "Assign this to Lee");

        assert!(prompt.contains("Ticket id: 42"));
        assert!(prompt.contains("Tags: billing, refund"));
        assert!(prompt.contains("Status (field id: 1)"));
        assert!(prompt.contains("Allowed values: New, Resolved"));
        assert!(prompt.contains("Type: agent"));
        assert!(prompt.contains("- Dana (id: 7)"));
        assert!(prompt.contains("- lee@example.com (id: 8)"));
        assert!(prompt.contains("Time: 2025-03-01 09:30:00 UTC"));
        assert!(prompt.contains("Comment: Looking into it"));
        assert!(prompt.contains("Changed Status: 'New' -> 'In Progress'"));
        assert!(prompt.ends_with("Assign this to Lee"));
        // Only select fields advertise allowed values.
        assert_eq!(prompt.matches("Allowed values").count(), 1);
    }

    #[test]
    fn empty_history_is_spelled_out() {
        let ticket = TicketBrief {
            id: 1,
            title: "t",
            description: "d",
            tags: &[],
            fields: &[],
            template_fields: &[],
        };
        assert!(user_prompt(&ticket, &[], &[], "hi").contains("No updates yet."));
    }

    #[test]
    fn tool_call_becomes_an_internal_update_by_default() {
        let request = parse_request(
            r#"{"ticketId":"42","fields":[{"id":"1","newValue":"Resolved"},{"id":2,"newValue":"8"}]}"#,
            42,
        )
        .unwrap();
        assert_eq!(
            request.field_updates,
            vec![
                FieldUpdate { id: 1, value: "Resolved".into() },
                FieldUpdate { id: 2, value: "8".into() },
            ]
        );
        assert!(request.internal);
        assert_eq!(request.comment, None);
        assert_eq!(request.new_tags, None);
    }

    #[test]
    fn explicit_comment_visibility_and_tags_are_kept() {
        let request = parse_request(
            r#"{"ticketId":42,"fields":[],"comment":" Refund issued ","internal":false,"tags":["refund"]}"#,
            42,
        )
        .unwrap();
        assert_eq!(request.comment.as_deref(), Some("Refund issued"));
        assert!(!request.internal);
        assert_eq!(request.new_tags, Some(vec!["refund".to_string()]));

        let blank = parse_request(r#"{"ticketId":"42","fields":[],"comment":"  "}"#, 42).unwrap();
        assert_eq!(blank.comment, None);
    }

    #[test]
    fn malformed_tool_calls_are_rejected() {
        assert_matches!(
            parse_request(r#"{"ticketId":"43","fields":[]}"#, 42),
            Err(CoreError::ExternalService(_))
        );
        assert_matches!(
            parse_request(r#"{"ticketId":"42","fields":[{"id":"x","newValue":"1"}]}"#, 42),
            Err(CoreError::ExternalService(_))
        );
        assert_matches!(
            parse_request(r#"{"ticketId":"42","fields":[{"id":"1"}]}"#, 42),
            Err(CoreError::ExternalService(_))
        );
        assert_matches!(
            parse_request(r#"{"ticketId":"42","fields":{}}"#, 42),
            Err(CoreError::ExternalService(_))
        );
        assert_matches!(
            parse_request(r#"{"ticketId":"42","fields":[],"tags":"refund"}"#, 42),
            Err(CoreError::ExternalService(_))
        );
        assert_matches!(parse_request("not json", 42), Err(CoreError::ExternalService(_)));
    }
}
