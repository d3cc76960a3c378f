//! Ticket template and template field models.

use autocrm_core::error::CoreError;
use autocrm_core::field::FieldType;
use autocrm_core::template::{FieldDefinition, TemplateField};
use autocrm_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `ticket_templates` table: one immutable template version.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Template {
    pub id: DbId,
    /// Shared by every version of the same template.
    pub lineage_id: Uuid,
    /// The lineage root, `None` on the root itself.
    pub parent_id: Option<DbId>,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Template {
    /// Id of the first version of this lineage.
    pub fn root_id(&self) -> DbId {
        self.parent_id.unwrap_or(self.id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A row from the `template_fields` table.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateFieldRow {
    pub id: DbId,
    pub template_id: DbId,
    pub field_key: Uuid,
    pub name: String,
    pub field_type: String,
    pub description: Option<String>,
    pub required: bool,
    pub rank: i32,
    pub default_value: Option<String>,
    pub choices: Vec<String>,
    pub is_default: bool,
    pub visible_to_customer: bool,
    pub editable_by_customer: bool,
}

impl TryFrom<TemplateFieldRow> for TemplateField {
    type Error = CoreError;

    fn try_from(row: TemplateFieldRow) -> Result<Self, Self::Error> {
        Ok(TemplateField {
            id: row.id,
            template_id: row.template_id,
            key: row.field_key,
            name: row.name,
            field_type: FieldType::parse(&row.field_type)?,
            description: row.description,
            required: row.required,
            rank: row.rank,
            default_value: row.default_value,
            choices: row.choices,
            is_default: row.is_default,
            visible_to_customer: row.visible_to_customer,
            editable_by_customer: row.editable_by_customer,
        })
    }
}

/// A template version together with its fields in rank order.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateDetail {
    #[serde(flatten)]
    pub template: Template,
    pub fields: Vec<TemplateField>,
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Insert payload for a template version row.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub lineage_id: Uuid,
    pub parent_id: Option<DbId>,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<DbId>,
}

/// Request body for `POST /templates`.
///
/// With `parent_id` set this creates a new version of that template's
/// lineage instead of a new template.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub parent_id: Option<DbId>,
}

/// Request body for `POST /templates/{id}/versions`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVersionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
}

/// Query parameters for `GET /templates`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateListParams {
    #[serde(default)]
    pub include_deleted: bool,
}
