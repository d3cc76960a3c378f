//! The ticket update planner and audit replay.
//!
//! [`plan_update`] is the single place that turns an update request into the
//! new field projection plus the audit deltas that explain it. The storage
//! layer writes both in one transaction. [`verify_audit`] folds the recorded
//! deltas over the creation snapshot and checks the result against the
//! stored projection.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field::{values_equal, FieldType};
use crate::roles::Actor;
use crate::template::TemplateField;
use crate::ticket::{normalize_tags, FieldSnapshot};
use crate::types::{DbId, Timestamp};

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Set one field of a ticket to a new raw value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub id: DbId,
    pub value: String,
}

/// One recorded field change inside a ticket update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub id: DbId,
    pub field: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub old_value: String,
    pub new_value: String,
}

/// An update request as issued by an actor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub field_updates: Vec<FieldUpdate>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub internal: bool,
    /// Replacement tag list. `None` leaves tags untouched.
    #[serde(default)]
    pub new_tags: Option<Vec<String>>,
}

/// The current state of a ticket as seen by the planner.
#[derive(Debug, Clone, Copy)]
pub struct TicketState<'a> {
    pub creator_id: DbId,
    pub fields: &'a [FieldSnapshot],
    pub tags: &'a [String],
    /// Fields of the template version the ticket was created from.
    pub template_fields: &'a [TemplateField],
}

/// The outcome of a non-empty update: what to store on the ticket and what
/// to append to its log.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate {
    pub fields: Vec<FieldSnapshot>,
    pub deltas: Vec<FieldDelta>,
    pub comment: Option<String>,
    pub internal: bool,
    /// Set only when the tag set actually changes.
    pub new_tags: Option<Vec<String>>,
}

impl PlannedUpdate {
    /// Whether the ticket row itself changes (as opposed to comment-only).
    pub fn changes_ticket(&self) -> bool {
        !self.deltas.is_empty() || self.new_tags.is_some()
    }
}

/// Read access to a stored audit entry.
///
/// Implemented by the persisted update row so that replay and projection
/// stay free of storage types.
pub trait AuditEntry {
    fn entry_id(&self) -> DbId;
    fn actor_id(&self) -> DbId;
    fn created_at(&self) -> Timestamp;
    fn is_internal(&self) -> bool;
    fn comment(&self) -> Option<&str>;
    fn deltas(&self) -> &[FieldDelta];
    fn new_tags(&self) -> Option<&[String]>;
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Plan an update against the current ticket state.
///
/// Returns `Ok(None)` when nothing would change: no field value differs, the
/// comment is empty, and the tag set is unchanged. No audit row must be
/// written in that case.
pub fn plan_update(
    state: &TicketState<'_>,
    actor: &Actor,
    request: &UpdateRequest,
) -> Result<Option<PlannedUpdate>, CoreError> {
    if !actor.is_staff() {
        if state.creator_id != actor.id {
            return Err(CoreError::Forbidden(
                "Customers can only update their own tickets".into(),
            ));
        }
        if request.internal {
            return Err(CoreError::Forbidden(
                "Customers cannot post internal updates".into(),
            ));
        }
    }

    let definitions: HashMap<DbId, &TemplateField> =
        state.template_fields.iter().map(|f| (f.id, f)).collect();

    let mut fields = state.fields.to_vec();
    let mut deltas = Vec::new();
    let mut seen = HashSet::new();

    for update in &request.field_updates {
        let slot = fields
            .iter_mut()
            .find(|f| f.id == update.id)
            .ok_or_else(|| {
                CoreError::Validation(format!("Field {} does not exist on this ticket", update.id))
            })?;
        if !seen.insert(update.id) {
            return Err(CoreError::Validation(format!(
                "Field '{}' was updated more than once",
                slot.name
            )));
        }
        let definition = definitions.get(&update.id).ok_or_else(|| {
            CoreError::Internal(format!(
                "Ticket field {} has no definition in its template",
                update.id
            ))
        })?;
        if !definition.editable_by(actor) {
            return Err(CoreError::Forbidden(format!(
                "Field '{}' cannot be changed by customers",
                slot.name
            )));
        }

        let new_value = definition.coerce(&update.value)?;
        if definition.required && !definition.is_default && new_value.is_empty() {
            return Err(CoreError::Validation(format!(
                "Field '{}' is required",
                slot.name
            )));
        }
        if values_equal(slot.field_type, &slot.value, &new_value) {
            continue;
        }

        deltas.push(FieldDelta {
            id: slot.id,
            field: slot.name.clone(),
            field_type: slot.field_type,
            old_value: std::mem::replace(&mut slot.value, new_value.clone()),
            new_value,
        });
    }

    let comment = normalize_comment(request.comment.as_deref());

    let new_tags = match &request.new_tags {
        Some(tags) => {
            let normalized = normalize_tags(tags);
            let current: BTreeSet<&str> = state.tags.iter().map(String::as_str).collect();
            let proposed: BTreeSet<&str> = normalized.iter().map(String::as_str).collect();
            if current == proposed {
                None
            } else if !actor.is_staff() {
                return Err(CoreError::Forbidden("Customers cannot change tags".into()));
            } else {
                Some(normalized)
            }
        }
        None => None,
    };

    if deltas.is_empty() && comment.is_none() && new_tags.is_none() {
        return Ok(None);
    }

    Ok(Some(PlannedUpdate {
        fields,
        deltas,
        comment,
        internal: request.internal,
        new_tags,
    }))
}

/// Trim a rich-text comment; comments with no text outside of markup count
/// as absent.
pub fn normalize_comment(comment: Option<&str>) -> Option<String> {
    let comment = comment?.trim();
    if is_blank_html(comment) {
        None
    } else {
        Some(comment.to_string())
    }
}

/// Whether rich text has no visible characters once markup is removed.
pub fn is_blank_html(text: &str) -> bool {
    HTML_TAG_RE.replace_all(text, "").trim().is_empty()
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// A recorded `old_value` that does not match the replayed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainBreak {
    pub update_id: DbId,
    pub field_id: DbId,
    /// Replayed value before the update, `None` if the field was unknown.
    pub expected_old: Option<String>,
    pub recorded_old: String,
}

/// A field whose stored value differs from the replayed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMismatch {
    pub field_id: DbId,
    pub field: String,
    pub replayed: Option<String>,
    pub stored: Option<String>,
}

/// Result of replaying a ticket's audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub consistent: bool,
    pub updates_replayed: usize,
    pub chain_breaks: Vec<ChainBreak>,
    pub mismatches: Vec<FieldMismatch>,
}

/// Fold all deltas over the creation snapshot in `(created_at, id)` order.
///
/// Returns the replayed fields and every delta whose `old_value` disagrees
/// with the state it was applied to.
pub fn replay<E: AuditEntry>(
    initial: &[FieldSnapshot],
    entries: &[E],
) -> (Vec<FieldSnapshot>, Vec<ChainBreak>) {
    let mut ordered: Vec<&E> = entries.iter().collect();
    ordered.sort_by_key(|e| (e.created_at(), e.entry_id()));

    let mut fields = initial.to_vec();
    let mut breaks = Vec::new();

    for entry in ordered {
        for delta in entry.deltas() {
            match fields.iter_mut().find(|f| f.id == delta.id) {
                Some(slot) => {
                    if !values_equal(slot.field_type, &slot.value, &delta.old_value) {
                        breaks.push(ChainBreak {
                            update_id: entry.entry_id(),
                            field_id: delta.id,
                            expected_old: Some(slot.value.clone()),
                            recorded_old: delta.old_value.clone(),
                        });
                    }
                    slot.value = delta.new_value.clone();
                }
                None => breaks.push(ChainBreak {
                    update_id: entry.entry_id(),
                    field_id: delta.id,
                    expected_old: None,
                    recorded_old: delta.old_value.clone(),
                }),
            }
        }
    }

    (fields, breaks)
}

/// Check that the stored projection equals the fold of the audit log.
pub fn verify_audit<E: AuditEntry>(
    initial: &[FieldSnapshot],
    entries: &[E],
    stored: &[FieldSnapshot],
) -> AuditReport {
    let (replayed, chain_breaks) = replay(initial, entries);

    let mut mismatches = Vec::new();
    for field in &replayed {
        let stored_value = stored.iter().find(|s| s.id == field.id).map(|s| &s.value);
        let matches = stored_value
            .is_some_and(|s| values_equal(field.field_type, &field.value, s));
        if !matches {
            mismatches.push(FieldMismatch {
                field_id: field.id,
                field: field.name.clone(),
                replayed: Some(field.value.clone()),
                stored: stored_value.cloned(),
            });
        }
    }
    for field in stored {
        if !replayed.iter().any(|r| r.id == field.id) {
            mismatches.push(FieldMismatch {
                field_id: field.id,
                field: field.name.clone(),
                replayed: None,
                stored: Some(field.value.clone()),
            });
        }
    }

    AuditReport {
        consistent: chain_breaks.is_empty() && mismatches.is_empty(),
        updates_replayed: entries.len(),
        chain_breaks,
        mismatches,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::roles::Role;
    use crate::ticket::build_initial_fields;
    use crate::ticket::tests::sample_template;

    /// In-memory audit entry used by replay and projection tests.
    #[derive(Debug, Clone)]
    pub(crate) struct Entry {
        pub id: DbId,
        pub actor: DbId,
        pub at: Timestamp,
        pub internal: bool,
        pub comment: Option<String>,
        pub deltas: Vec<FieldDelta>,
        pub tags: Option<Vec<String>>,
    }

    impl AuditEntry for Entry {
        fn entry_id(&self) -> DbId {
            self.id
        }
        fn actor_id(&self) -> DbId {
            self.actor
        }
        fn created_at(&self) -> Timestamp {
            self.at
        }
        fn is_internal(&self) -> bool {
            self.internal
        }
        fn comment(&self) -> Option<&str> {
            self.comment.as_deref()
        }
        fn deltas(&self) -> &[FieldDelta] {
            &self.deltas
        }
        fn new_tags(&self) -> Option<&[String]> {
            self.tags.as_deref()
        }
    }

    const CREATOR: DbId = 100;

    fn agent() -> Actor {
        Actor::new(7, Role::Agent)
    }

    fn creator() -> Actor {
        Actor::new(CREATOR, Role::Customer)
    }

    fn initial() -> Vec<FieldSnapshot> {
        build_initial_fields(
            &sample_template(),
            &[FieldUpdate {
                id: 4,
                value: "A-1".into(),
            }],
            &creator(),
        )
        .unwrap()
    }

    fn set(id: DbId, value: &str) -> FieldUpdate {
        FieldUpdate {
            id,
            value: value.to_string(),
        }
    }

    fn plan(
        fields: &[FieldSnapshot],
        tags: &[String],
        actor: &Actor,
        request: &UpdateRequest,
    ) -> Result<Option<PlannedUpdate>, CoreError> {
        let template = sample_template();
        let state = TicketState {
            creator_id: CREATOR,
            fields,
            tags,
            template_fields: &template,
        };
        plan_update(&state, actor, request)
    }

    fn entry_from(id: DbId, offset_secs: i64, planned: &PlannedUpdate) -> Entry {
        Entry {
            id,
            actor: 7,
            at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset_secs),
            internal: planned.internal,
            comment: planned.comment.clone(),
            deltas: planned.deltas.clone(),
            tags: planned.new_tags.clone(),
        }
    }

    #[test]
    fn status_change_records_old_and_new_value() {
        let request = UpdateRequest {
            field_updates: vec![set(2, "Resolved")],
            internal: true,
            ..Default::default()
        };
        let planned = plan(&initial(), &[], &agent(), &request).unwrap().unwrap();
        assert_eq!(
            planned.deltas,
            vec![FieldDelta {
                id: 2,
                field: "Status".into(),
                field_type: FieldType::Select,
                old_value: "New".into(),
                new_value: "Resolved".into(),
            }]
        );
        assert!(planned.internal);
        assert_eq!(planned.fields[1].value, "Resolved");
    }

    #[test]
    fn repeating_the_same_update_is_suppressed() {
        let request = UpdateRequest {
            field_updates: vec![set(2, "Resolved")],
            internal: true,
            ..Default::default()
        };
        let first = plan(&initial(), &[], &agent(), &request).unwrap().unwrap();
        let second = plan(&first.fields, &[], &agent(), &request).unwrap();
        assert_eq!(second, None);
    }

    #[test]
    fn markup_only_comment_counts_as_empty() {
        let request = UpdateRequest {
            comment: Some("<p>  </p><br/>".into()),
            ..Default::default()
        };
        assert_eq!(plan(&initial(), &[], &agent(), &request).unwrap(), None);
        assert_eq!(normalize_comment(Some(" <p>Hi</p> ")).as_deref(), Some("<p>Hi</p>"));
    }

    #[test]
    fn comment_only_update_has_no_deltas() {
        let request = UpdateRequest {
            comment: Some("<p>Any news?</p>".into()),
            ..Default::default()
        };
        let planned = plan(&initial(), &[], &creator(), &request).unwrap().unwrap();
        assert!(planned.deltas.is_empty());
        assert!(!planned.changes_ticket());
    }

    #[test]
    fn customer_cannot_post_internal_updates() {
        let request = UpdateRequest {
            comment: Some("hello".into()),
            internal: true,
            ..Default::default()
        };
        assert_matches!(
            plan(&initial(), &[], &creator(), &request),
            Err(CoreError::Forbidden(_))
        );
    }

    #[test]
    fn customer_cannot_update_someone_elses_ticket() {
        let stranger = Actor::new(555, Role::Customer);
        let request = UpdateRequest {
            comment: Some("hello".into()),
            ..Default::default()
        };
        assert_matches!(
            plan(&initial(), &[], &stranger, &request),
            Err(CoreError::Forbidden(_))
        );
    }

    #[test]
    fn customer_cannot_change_agent_only_fields_or_tags() {
        let request = UpdateRequest {
            field_updates: vec![set(2, "Resolved")],
            ..Default::default()
        };
        assert_matches!(
            plan(&initial(), &[], &creator(), &request),
            Err(CoreError::Forbidden(_))
        );

        let request = UpdateRequest {
            new_tags: Some(vec!["vip".into()]),
            ..Default::default()
        };
        assert_matches!(
            plan(&initial(), &[], &creator(), &request),
            Err(CoreError::Forbidden(_))
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let request = UpdateRequest {
            field_updates: vec![set(42, "x")],
            ..Default::default()
        };
        assert_matches!(
            plan(&initial(), &[], &agent(), &request),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn select_value_outside_choices_is_rejected() {
        let request = UpdateRequest {
            field_updates: vec![set(2, "Closed")],
            ..Default::default()
        };
        assert_matches!(
            plan(&initial(), &[], &agent(), &request),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn tags_compare_as_sets_and_replace_whole_list() {
        let current = vec!["billing".to_string(), "vip".to_string()];
        let same = UpdateRequest {
            new_tags: Some(vec!["vip".into(), " billing".into()]),
            ..Default::default()
        };
        assert_eq!(plan(&initial(), &current, &agent(), &same).unwrap(), None);

        let changed = UpdateRequest {
            new_tags: Some(vec!["vip".into()]),
            ..Default::default()
        };
        let planned = plan(&initial(), &current, &agent(), &changed).unwrap().unwrap();
        assert_eq!(planned.new_tags, Some(vec!["vip".to_string()]));
        assert!(planned.deltas.is_empty());
    }

    #[test]
    fn replay_reconstructs_the_projection() {
        let start = initial();
        let first = plan(
            &start,
            &[],
            &agent(),
            &UpdateRequest {
                field_updates: vec![set(2, "In Progress"), set(1, "7")],
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        let second = plan(
            &first.fields,
            &[],
            &agent(),
            &UpdateRequest {
                field_updates: vec![set(2, "Resolved"), set(5, "called back")],
                internal: true,
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();

        // Stored out of order; replay must sort by created_at.
        let entries = vec![entry_from(2, 10, &second), entry_from(1, 5, &first)];
        let report = verify_audit(&start, &entries, &second.fields);
        assert!(report.consistent, "{report:?}");
        assert_eq!(report.updates_replayed, 2);
    }

    #[test]
    fn verify_detects_a_tampered_projection() {
        let start = initial();
        let planned = plan(
            &start,
            &[],
            &agent(),
            &UpdateRequest {
                field_updates: vec![set(2, "In Progress")],
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();

        let mut tampered = planned.fields.clone();
        tampered[1].value = "Resolved".into();

        let report = verify_audit(&start, &[entry_from(1, 0, &planned)], &tampered);
        assert!(!report.consistent);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].field, "Status");
    }

    #[test]
    fn verify_detects_a_broken_chain() {
        let start = initial();
        let mut planned = plan(
            &start,
            &[],
            &agent(),
            &UpdateRequest {
                field_updates: vec![set(2, "In Progress")],
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        planned.deltas[0].old_value = "Waiting For Customer".into();

        let report = verify_audit(&start, &[entry_from(1, 0, &planned)], &planned.fields);
        assert!(!report.consistent);
        assert_eq!(report.chain_breaks.len(), 1);
    }
}
