//! Template field definitions, validation, and copy-on-write versioning rules.
//!
//! A template version is immutable once written. Editing a template produces
//! a new version in the same lineage; each field carries a `key` that stays
//! stable across versions so system fields keep their identity.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::field::{canonicalize, FieldType};
use crate::roles::Actor;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// System fields
// ---------------------------------------------------------------------------

pub const ASSIGNED_TO: &str = "Assigned To";
pub const STATUS: &str = "Status";
pub const PRIORITY: &str = "Priority";

pub const STATUS_NEW: &str = "New";
pub const STATUS_IN_PROGRESS: &str = "In Progress";
pub const STATUS_WAITING_FOR_CUSTOMER: &str = "Waiting For Customer";
pub const STATUS_RESOLVED: &str = "Resolved";

/// Priority choices; lower is more urgent.
pub const PRIORITY_CHOICES: [&str; 4] = ["0", "1", "2", "3"];

/// The system fields every template carries, in their seeded order.
pub fn system_fields() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition {
            key: None,
            name: ASSIGNED_TO.to_string(),
            field_type: FieldType::Agent,
            description: Some("The agent responsible for this ticket".to_string()),
            required: false,
            rank: 0,
            default_value: None,
            choices: Vec::new(),
            visible_to_customer: true,
            editable_by_customer: false,
        },
        FieldDefinition {
            key: None,
            name: STATUS.to_string(),
            field_type: FieldType::Select,
            description: Some("Current status of the ticket".to_string()),
            required: true,
            rank: 1,
            default_value: Some(STATUS_NEW.to_string()),
            choices: [
                STATUS_NEW,
                STATUS_IN_PROGRESS,
                STATUS_WAITING_FOR_CUSTOMER,
                STATUS_RESOLVED,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            visible_to_customer: true,
            editable_by_customer: false,
        },
        FieldDefinition {
            key: None,
            name: PRIORITY.to_string(),
            field_type: FieldType::Select,
            description: Some("Ticket priority (0 = Highest, 3 = Lowest)".to_string()),
            required: true,
            rank: 2,
            default_value: None,
            choices: PRIORITY_CHOICES.iter().map(|s| s.to_string()).collect(),
            visible_to_customer: true,
            editable_by_customer: false,
        },
    ]
}

/// Return the canonical system field name if `name` names one.
fn system_field_name(name: &str) -> Option<&'static str> {
    [ASSIGNED_TO, STATUS, PRIORITY]
        .into_iter()
        .find(|s| s.eq_ignore_ascii_case(name.trim()))
}

fn system_field_type(name: &str) -> FieldType {
    if name == ASSIGNED_TO {
        FieldType::Agent
    } else {
        FieldType::Select
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A field as submitted by a client when creating a template or version.
///
/// `key` links the field to the same field in the parent version; omit it
/// for fields that are new in this version.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldDefinition {
    #[serde(default)]
    pub key: Option<Uuid>,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    pub rank: i32,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub visible_to_customer: bool,
    #[serde(default)]
    pub editable_by_customer: bool,
}

/// A validated field, ready to be written as part of a new template version.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub key: Uuid,
    pub name: String,
    pub field_type: FieldType,
    pub description: Option<String>,
    pub required: bool,
    pub rank: i32,
    pub default_value: Option<String>,
    pub choices: Vec<String>,
    pub is_default: bool,
    pub visible_to_customer: bool,
    pub editable_by_customer: bool,
}

/// A field of a persisted template version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateField {
    pub id: DbId,
    pub template_id: DbId,
    pub key: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub description: Option<String>,
    pub required: bool,
    pub rank: i32,
    pub default_value: Option<String>,
    pub choices: Vec<String>,
    pub is_default: bool,
    pub visible_to_customer: bool,
    pub editable_by_customer: bool,
}

impl TemplateField {
    /// Validate a raw value against this field and return its storage form.
    ///
    /// Select values must be one of the field's own choices.
    pub fn coerce(&self, raw: &str) -> Result<String, CoreError> {
        let value = canonicalize(self.field_type, raw)
            .map_err(|e| CoreError::Validation(format!("Field '{}': {}", self.name, strip(e))))?;
        if self.field_type == FieldType::Select
            && !value.is_empty()
            && !self.choices.iter().any(|c| c == &value)
        {
            return Err(CoreError::Validation(format!(
                "Field '{}': '{}' is not one of {:?}",
                self.name, value, self.choices
            )));
        }
        Ok(value)
    }

    /// The value a new ticket starts with when nothing is submitted.
    pub fn initial_value(&self) -> String {
        self.default_value.clone().unwrap_or_default()
    }

    /// Staff may edit every field; customers only customer-editable ones.
    pub fn editable_by(&self, actor: &Actor) -> bool {
        actor.is_staff() || self.editable_by_customer
    }
}

fn strip(err: CoreError) -> String {
    match err {
        CoreError::Validation(msg) => msg,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a template name, returning it trimmed.
pub fn validate_template_name(name: &str) -> Result<String, CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Template name must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

/// Validate field definitions for a brand-new template (root of a lineage).
///
/// Fields named like a system field become that system field and must keep
/// its type. System fields the client did not submit are appended after the
/// highest submitted rank.
pub fn prepare_root_fields(defs: &[FieldDefinition]) -> Result<Vec<FieldSpec>, CoreError> {
    let mut specs = normalize_all(defs)?;

    for spec in &mut specs {
        spec.key = Uuid::new_v4();
        if let Some(system) = system_field_name(&spec.name) {
            claim_system_field(spec, system)?;
        }
    }

    let mut next_rank = specs.iter().map(|s| s.rank).max().unwrap_or(-1) + 1;
    for system in system_fields() {
        if specs.iter().any(|s| s.is_default && s.name == system.name) {
            continue;
        }
        let mut spec = normalize(&system)?;
        spec.key = Uuid::new_v4();
        spec.is_default = true;
        spec.rank = next_rank;
        next_rank += 1;
        specs.push(spec);
    }

    specs.sort_by_key(|s| s.rank);
    Ok(specs)
}

/// Validate field definitions for a new version of an existing lineage.
///
/// Every system field of `parent` must be present (by key) with the same name
/// and type. Fields referencing an unknown key are rejected.
pub fn prepare_version_fields(
    parent: &[TemplateField],
    defs: &[FieldDefinition],
) -> Result<Vec<FieldSpec>, CoreError> {
    let mut specs = normalize_all(defs)?;
    let by_key: HashMap<Uuid, &TemplateField> = parent.iter().map(|f| (f.key, f)).collect();
    let mut seen_keys = HashSet::new();

    for (spec, def) in specs.iter_mut().zip(defs) {
        match def.key {
            Some(key) => {
                let previous = by_key.get(&key).ok_or_else(|| {
                    CoreError::Validation(format!(
                        "Field '{}' references unknown key {key}",
                        spec.name
                    ))
                })?;
                if !seen_keys.insert(key) {
                    return Err(CoreError::Validation(format!(
                        "Field key {key} appears more than once"
                    )));
                }
                spec.key = key;
                if previous.is_default {
                    if spec.name != previous.name {
                        return Err(CoreError::Validation(format!(
                            "System field '{}' cannot be renamed",
                            previous.name
                        )));
                    }
                    if spec.field_type != previous.field_type {
                        return Err(CoreError::Validation(format!(
                            "System field '{}' cannot change type",
                            previous.name
                        )));
                    }
                    spec.is_default = true;
                }
            }
            None => {
                if let Some(system) = system_field_name(&spec.name) {
                    return Err(CoreError::Validation(format!(
                        "'{system}' is a system field; reference it by key"
                    )));
                }
                spec.key = Uuid::new_v4();
            }
        }
    }

    for field in parent.iter().filter(|f| f.is_default) {
        if !seen_keys.contains(&field.key) {
            return Err(CoreError::Validation(format!(
                "System field '{}' cannot be removed",
                field.name
            )));
        }
    }

    specs.sort_by_key(|s| s.rank);
    Ok(specs)
}

fn claim_system_field(spec: &mut FieldSpec, system: &'static str) -> Result<(), CoreError> {
    let expected = system_field_type(system);
    if spec.field_type != expected {
        return Err(CoreError::Validation(format!(
            "'{system}' is a system field and must be of type {expected}"
        )));
    }
    spec.name = system.to_string();
    spec.is_default = true;
    Ok(())
}

/// Field-level checks shared by root and version creation.
fn normalize_all(defs: &[FieldDefinition]) -> Result<Vec<FieldSpec>, CoreError> {
    if defs.is_empty() {
        return Err(CoreError::Validation(
            "A template needs at least one field".into(),
        ));
    }

    let specs = defs.iter().map(normalize).collect::<Result<Vec<_>, _>>()?;

    let mut ranks = HashSet::new();
    let mut names = HashSet::new();
    for spec in &specs {
        if !ranks.insert(spec.rank) {
            return Err(CoreError::Validation(format!(
                "Rank {} is used by more than one field",
                spec.rank
            )));
        }
        if !names.insert(spec.name.to_lowercase()) {
            return Err(CoreError::Validation(format!(
                "Field name '{}' is used more than once",
                spec.name
            )));
        }
    }
    Ok(specs)
}

fn normalize(def: &FieldDefinition) -> Result<FieldSpec, CoreError> {
    let name = def.name.trim().to_string();
    if name.is_empty() {
        return Err(CoreError::Validation("Field name must not be empty".into()));
    }

    let mut choices: Vec<String> = Vec::new();
    for choice in def.choices.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if choices.iter().any(|c| c == choice) {
            return Err(CoreError::Validation(format!(
                "Field '{name}' lists choice '{choice}' more than once"
            )));
        }
        choices.push(choice.to_string());
    }

    match def.field_type {
        FieldType::Select if choices.is_empty() => {
            return Err(CoreError::Validation(format!(
                "Select field '{name}' needs at least one choice"
            )));
        }
        FieldType::Select => {}
        _ if !choices.is_empty() => {
            return Err(CoreError::Validation(format!(
                "Only select fields may define choices ('{name}' is {})",
                def.field_type
            )));
        }
        _ => {}
    }

    if def.editable_by_customer && !def.visible_to_customer {
        return Err(CoreError::Validation(format!(
            "Field '{name}' cannot be editable by customers without being visible to them"
        )));
    }

    let mut spec = FieldSpec {
        key: Uuid::nil(),
        name,
        field_type: def.field_type,
        description: def
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        required: def.required,
        rank: def.rank,
        default_value: None,
        choices,
        is_default: false,
        visible_to_customer: def.visible_to_customer,
        editable_by_customer: def.editable_by_customer,
    };

    if let Some(raw) = def.default_value.as_deref() {
        let probe = spec.as_unsaved_field();
        let value = probe.coerce(raw)?;
        spec.default_value = (!value.is_empty()).then_some(value);
    }

    Ok(spec)
}

impl FieldSpec {
    /// View this spec as a field so the shared value checks can run on it.
    fn as_unsaved_field(&self) -> TemplateField {
        TemplateField {
            id: 0,
            template_id: 0,
            key: self.key,
            name: self.name.clone(),
            field_type: self.field_type,
            description: self.description.clone(),
            required: self.required,
            rank: self.rank,
            default_value: self.default_value.clone(),
            choices: self.choices.clone(),
            is_default: self.is_default,
            visible_to_customer: self.visible_to_customer,
            editable_by_customer: self.editable_by_customer,
        }
    }
}
