//! Repository for the `ticket_templates` and `template_fields` tables.
//!
//! Template versions are insert-only. A "template" as users see it is a
//! lineage: every row sharing a `lineage_id`, the newest being current.

use autocrm_core::template::{FieldSpec, TemplateField};
use autocrm_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::template::{NewTemplate, Template, TemplateDetail, TemplateFieldRow};

/// Column list for `ticket_templates` queries.
const COLUMNS: &str = "\
    id, lineage_id, parent_id, name, description, created_by, \
    created_at, updated_at, deleted_at";

/// Column list for `template_fields` queries.
const FIELD_COLUMNS: &str = "\
    id, template_id, field_key, name, field_type, description, required, rank, \
    default_value, choices, is_default, visible_to_customer, editable_by_customer";

/// Provides insert-only versioning for templates and their fields.
pub struct TemplateRepo;

impl TemplateRepo {
    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert a template version and all of its fields in one transaction.
    pub async fn create_version(
        pool: &PgPool,
        input: &NewTemplate,
        fields: &[FieldSpec],
    ) -> Result<TemplateDetail, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let insert_template = format!(
            "INSERT INTO ticket_templates (lineage_id, parent_id, name, description, created_by) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        let template = sqlx::query_as::<_, Template>(&insert_template)
            .bind(input.lineage_id)
            .bind(input.parent_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.created_by)
            .fetch_one(&mut *tx)
            .await?;

        let insert_field = format!(
            "INSERT INTO template_fields \
                (template_id, field_key, name, field_type, description, required, rank, \
                 default_value, choices, is_default, visible_to_customer, editable_by_customer) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {FIELD_COLUMNS}"
        );
        let mut rows = Vec::with_capacity(fields.len());
        for spec in fields {
            let row = sqlx::query_as::<_, TemplateFieldRow>(&insert_field)
                .bind(template.id)
                .bind(spec.key)
                .bind(&spec.name)
                .bind(spec.field_type.as_str())
                .bind(&spec.description)
                .bind(spec.required)
                .bind(spec.rank)
                .bind(&spec.default_value)
                .bind(&spec.choices)
                .bind(spec.is_default)
                .bind(spec.visible_to_customer)
                .bind(spec.editable_by_customer)
                .fetch_one(&mut *tx)
                .await?;
            rows.push(row);
        }

        tx.commit().await?;

        let mut fields = into_fields(rows)?;
        fields.sort_by_key(|f| f.rank);
        Ok(TemplateDetail { template, fields })
    }

    /// Soft-delete every version of a lineage. Returns the number of rows
    /// that were not already deleted.
    pub async fn soft_delete_lineage(pool: &PgPool, lineage_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ticket_templates SET deleted_at = NOW() \
             WHERE lineage_id = $1 AND deleted_at IS NULL",
        )
        .bind(lineage_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Find a template version by id, including soft-deleted ones.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Template>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM ticket_templates WHERE id = $1");
        sqlx::query_as::<_, Template>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// A template version with its fields in rank order.
    pub async fn find_detail(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<TemplateDetail>, sqlx::Error> {
        let Some(template) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let fields = Self::list_fields(pool, id).await?;
        Ok(Some(TemplateDetail { template, fields }))
    }

    /// Fields of one template version in rank order.
    pub async fn list_fields(
        pool: &PgPool,
        template_id: DbId,
    ) -> Result<Vec<TemplateField>, sqlx::Error> {
        let query = format!(
            "SELECT {FIELD_COLUMNS} FROM template_fields \
             WHERE template_id = $1 \
             ORDER BY rank ASC"
        );
        let rows = sqlx::query_as::<_, TemplateFieldRow>(&query)
            .bind(template_id)
            .fetch_all(pool)
            .await?;
        into_fields(rows)
    }

    /// [`list_fields`](Self::list_fields) on a connection already held by
    /// a transaction.
    pub async fn list_fields_tx(
        tx: &mut Transaction<'_, Postgres>,
        template_id: DbId,
    ) -> Result<Vec<TemplateField>, sqlx::Error> {
        let query = format!(
            "SELECT {FIELD_COLUMNS} FROM template_fields \
             WHERE template_id = $1 \
             ORDER BY rank ASC"
        );
        let rows = sqlx::query_as::<_, TemplateFieldRow>(&query)
            .bind(template_id)
            .fetch_all(&mut **tx)
            .await?;
        into_fields(rows)
    }

    /// The newest version of every lineage, newest lineage first.
    ///
    /// Deleted lineages are skipped unless `include_deleted` is set.
    pub async fn list_latest(
        pool: &PgPool,
        include_deleted: bool,
    ) -> Result<Vec<Template>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ( \
                SELECT DISTINCT ON (lineage_id) {COLUMNS} FROM ticket_templates \
                WHERE ($1 OR deleted_at IS NULL) \
                ORDER BY lineage_id, id DESC \
             ) latest \
             ORDER BY id DESC"
        );
        sqlx::query_as::<_, Template>(&query)
            .bind(include_deleted)
            .fetch_all(pool)
            .await
    }

    /// Every version of a lineage, newest first.
    pub async fn list_history(
        pool: &PgPool,
        lineage_id: Uuid,
    ) -> Result<Vec<Template>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ticket_templates \
             WHERE lineage_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Template>(&query)
            .bind(lineage_id)
            .fetch_all(pool)
            .await
    }
}

fn into_fields(rows: Vec<TemplateFieldRow>) -> Result<Vec<TemplateField>, sqlx::Error> {
    rows.into_iter()
        .map(TemplateField::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
