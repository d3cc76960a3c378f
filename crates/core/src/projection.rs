//! Role-scoped read views of tickets and their audit logs.
//!
//! Projection is pure: it reads a ticket snapshot, the fields of the
//! ticket's own template version, and the audit entries, and returns new
//! values. Select choices and editability are joined in from the template
//! version at read time.

use std::collections::HashMap;

use serde::Serialize;

use crate::field::FieldType;
use crate::roles::Actor;
use crate::template::TemplateField;
use crate::ticket::FieldSnapshot;
use crate::types::{DbId, Timestamp};
use crate::update::{AuditEntry, FieldDelta};

/// Who a view is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Staff,
    Customer,
}

impl Audience {
    pub fn for_actor(actor: &Actor) -> Self {
        if actor.is_staff() {
            Audience::Staff
        } else {
            Audience::Customer
        }
    }
}

/// A ticket field as shown to one audience.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedField {
    pub id: DbId,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub value: String,
    pub description: Option<String>,
    pub required: bool,
    pub is_default: bool,
    pub choices: Vec<String>,
    /// Whether this audience may change the value.
    pub editable: bool,
}

/// An audit entry as shown to one audience.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedUpdate {
    pub id: DbId,
    pub created_by: DbId,
    pub created_at: Timestamp,
    pub comment: Option<String>,
    pub updates: Vec<FieldDelta>,
    pub internal: bool,
    pub new_tags: Option<Vec<String>>,
}

/// Project a ticket's fields for an audience.
///
/// Customers only see fields whose template field is visible to customers;
/// a snapshot entry without a template definition is hidden from them.
pub fn project_fields(
    fields: &[FieldSnapshot],
    template_fields: &[TemplateField],
    audience: Audience,
) -> Vec<ProjectedField> {
    let definitions: HashMap<DbId, &TemplateField> =
        template_fields.iter().map(|f| (f.id, f)).collect();

    fields
        .iter()
        .filter_map(|field| {
            let definition = definitions.get(&field.id).copied();
            match (audience, definition) {
                (Audience::Customer, None) => None,
                (Audience::Customer, Some(d)) if !d.visible_to_customer => None,
                _ => Some(ProjectedField {
                    id: field.id,
                    name: field.name.clone(),
                    field_type: field.field_type,
                    value: field.value.clone(),
                    description: definition.and_then(|d| d.description.clone()),
                    required: definition.is_some_and(|d| d.required),
                    is_default: definition.is_some_and(|d| d.is_default),
                    choices: definition.map(|d| d.choices.clone()).unwrap_or_default(),
                    editable: match audience {
                        Audience::Staff => true,
                        Audience::Customer => definition.is_some_and(|d| d.editable_by_customer),
                    },
                }),
            }
        })
        .collect()
}

/// Project a ticket's audit log for an audience.
///
/// Customers never see internal entries, never see deltas of hidden fields,
/// and entries left with nothing to show are dropped.
pub fn project_updates<E: AuditEntry>(
    entries: &[E],
    template_fields: &[TemplateField],
    audience: Audience,
) -> Vec<ProjectedUpdate> {
    let visible: HashMap<DbId, bool> = template_fields
        .iter()
        .map(|f| (f.id, f.visible_to_customer))
        .collect();

    entries
        .iter()
        .filter(|e| audience == Audience::Staff || !e.is_internal())
        .filter_map(|e| {
            let updates: Vec<FieldDelta> = e
                .deltas()
                .iter()
                .filter(|d| {
                    audience == Audience::Staff || visible.get(&d.id).copied().unwrap_or(false)
                })
                .cloned()
                .collect();
            let projected = ProjectedUpdate {
                id: e.entry_id(),
                created_by: e.actor_id(),
                created_at: e.created_at(),
                comment: e.comment().map(str::to_string),
                updates,
                internal: e.is_internal(),
                new_tags: e.new_tags().map(<[String]>::to_vec),
            };
            let empty = projected.comment.is_none()
                && projected.updates.is_empty()
                && projected.new_tags.is_none();
            (!empty).then_some(projected)
        })
        .collect()
}

/// The customer view of a ticket: visible fields and public updates only.
pub fn project_for_customer<E: AuditEntry>(
    fields: &[FieldSnapshot],
    entries: &[E],
    template_fields: &[TemplateField],
) -> (Vec<ProjectedField>, Vec<ProjectedUpdate>) {
    (
        project_fields(fields, template_fields, Audience::Customer),
        project_updates(entries, template_fields, Audience::Customer),
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ticket::tests::sample_template;
    use crate::update::tests::Entry;

    fn snapshot() -> Vec<FieldSnapshot> {
        sample_template()
            .iter()
            .map(|f| FieldSnapshot {
                id: f.id,
                name: f.name.clone(),
                field_type: f.field_type,
                value: format!("v{}", f.id),
            })
            .collect()
    }

    fn delta(id: DbId, field: &str) -> FieldDelta {
        FieldDelta {
            id,
            field: field.to_string(),
            field_type: FieldType::Text,
            old_value: String::new(),
            new_value: "x".into(),
        }
    }

    fn entry(id: DbId, internal: bool, comment: Option<&str>, deltas: Vec<FieldDelta>) -> Entry {
        Entry {
            id,
            actor: 7,
            at: Utc::now(),
            internal,
            comment: comment.map(str::to_string),
            deltas,
            tags: None,
        }
    }

    #[test]
    fn customer_view_hides_fields_not_visible_to_customers() {
        let fields = project_fields(&snapshot(), &sample_template(), Audience::Customer);
        assert!(fields.iter().all(|f| f.name != "Internal notes"));
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn customer_view_joins_choices_and_editability() {
        let fields = project_fields(&snapshot(), &sample_template(), Audience::Customer);
        let status = fields.iter().find(|f| f.name == "Status").unwrap();
        assert_eq!(status.choices.len(), 4);
        assert!(!status.editable);
        let order = fields.iter().find(|f| f.name == "Order number").unwrap();
        assert!(order.editable);
    }

    #[test]
    fn staff_view_keeps_everything_editable() {
        let fields = project_fields(&snapshot(), &sample_template(), Audience::Staff);
        assert_eq!(fields.len(), 5);
        assert!(fields.iter().all(|f| f.editable));
    }

    #[test]
    fn unknown_snapshot_field_is_hidden_from_customers() {
        let mut fields = snapshot();
        fields.push(FieldSnapshot {
            id: 99,
            name: "Ghost".into(),
            field_type: FieldType::Text,
            value: "boo".into(),
        });
        let projected = project_fields(&fields, &sample_template(), Audience::Customer);
        assert!(projected.iter().all(|f| f.id != 99));
    }

    #[test]
    fn customer_view_never_includes_internal_updates() {
        let entries = vec![
            entry(1, true, Some("internal note"), vec![]),
            entry(2, false, Some("public reply"), vec![]),
        ];
        let updates = project_updates(&entries, &sample_template(), Audience::Customer);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, 2);
        assert!(updates.iter().all(|u| !u.internal));
    }

    #[test]
    fn hidden_field_deltas_are_redacted_and_empty_entries_dropped() {
        let entries = vec![
            entry(1, false, None, vec![delta(5, "Internal notes")]),
            entry(2, false, None, vec![delta(5, "Internal notes"), delta(2, "Status")]),
        ];
        let updates = project_updates(&entries, &sample_template(), Audience::Customer);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].updates.len(), 1);
        assert_eq!(updates[0].updates[0].field, "Status");

        let staff = project_updates(&entries, &sample_template(), Audience::Staff);
        assert_eq!(staff.len(), 2);
    }

    #[test]
    fn projection_does_not_mutate_input() {
        let fields = snapshot();
        let before = fields.clone();
        let entries = vec![entry(1, true, Some("x"), vec![delta(5, "Internal notes")])];
        let _ = project_for_customer(&fields, &entries, &sample_template());
        assert_eq!(fields, before);
        assert_eq!(entries[0].deltas.len(), 1);
    }
}
