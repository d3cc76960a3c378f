//! Ticket field snapshots and creation-time rules.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field::FieldType;
use crate::roles::Actor;
use crate::template::TemplateField;
use crate::types::DbId;
use crate::update::FieldUpdate;

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// One entry of a ticket's `fields` list: a frozen copy of the template
/// field's identity plus the current value (`""` when not set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub id: DbId,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub value: String,
}

/// Find a snapshot entry by field name.
pub fn find_by_name<'a>(fields: &'a [FieldSnapshot], name: &str) -> Option<&'a FieldSnapshot> {
    fields.iter().find(|f| f.name == name)
}

pub fn validate_title(title: &str) -> Result<String, CoreError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Title must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::Validation(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Trim tags, drop blanks and duplicates, keep first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Build the creation snapshot of a ticket from its template version.
///
/// Every template field appears once, in rank order. Submitted values are
/// taken only for fields the actor may edit; everything else starts from the
/// field default. Required non-system fields the actor can edit must end up
/// non-empty.
pub fn build_initial_fields(
    template_fields: &[TemplateField],
    submitted: &[FieldUpdate],
    actor: &Actor,
) -> Result<Vec<FieldSnapshot>, CoreError> {
    let by_id: HashMap<DbId, &TemplateField> =
        template_fields.iter().map(|f| (f.id, f)).collect();

    let mut values: HashMap<DbId, String> = HashMap::new();
    for update in submitted {
        let field = by_id.get(&update.id).ok_or_else(|| {
            CoreError::Validation(format!("Field {} is not part of this template", update.id))
        })?;
        if !field.editable_by(actor) {
            return Err(CoreError::Forbidden(format!(
                "Field '{}' cannot be set by customers",
                field.name
            )));
        }
        if values.insert(field.id, field.coerce(&update.value)?).is_some() {
            return Err(CoreError::Validation(format!(
                "Field '{}' was submitted more than once",
                field.name
            )));
        }
    }

    let mut ordered: Vec<&TemplateField> = template_fields.iter().collect();
    ordered.sort_by_key(|f| f.rank);

    let mut snapshot = Vec::with_capacity(ordered.len());
    for field in ordered {
        let value = values
            .remove(&field.id)
            .unwrap_or_else(|| field.initial_value());
        if field.required && !field.is_default && field.editable_by(actor) && value.is_empty() {
            return Err(CoreError::Validation(format!(
                "Field '{}' is required",
                field.name
            )));
        }
        snapshot.push(FieldSnapshot {
            id: field.id,
            name: field.name.clone(),
            field_type: field.field_type,
            value,
        });
    }
    Ok(snapshot)
}
