//! Template creation, versioning and lineage deletion.
//!
//! Every edit forks a new immutable version. All versions of a template share
//! its `lineage_id`, and `parent_id` always names the lineage root.

use autocrm_core::error::CoreError;
use autocrm_core::roles::Actor;
use autocrm_core::template::{
    prepare_root_fields, prepare_version_fields, validate_template_name, FieldDefinition,
};
use autocrm_core::types::DbId;
use autocrm_db::models::template::{NewTemplate, Template, TemplateDetail};
use autocrm_db::repositories::TemplateRepo;
use autocrm_db::DbPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Create the first version of a new template lineage.
///
/// Missing system fields ("Assigned To", "Status", "Priority") are seeded.
pub async fn create_template(
    pool: &DbPool,
    actor: &Actor,
    name: &str,
    description: Option<&str>,
    fields: &[FieldDefinition],
) -> AppResult<TemplateDetail> {
    let name = validate_template_name(name)?;
    let specs = prepare_root_fields(fields)?;

    let detail = TemplateRepo::create_version(
        pool,
        &NewTemplate {
            lineage_id: Uuid::new_v4(),
            parent_id: None,
            name,
            description: normalize_description(description),
            created_by: Some(actor.id),
        },
        &specs,
    )
    .await?;

    tracing::info!(
        template_id = detail.template.id,
        user_id = actor.id,
        fields = detail.fields.len(),
        "Template created"
    );
    Ok(detail)
}

/// Create a new version of the lineage that `parent_id` belongs to.
///
/// `parent_id` may name any version; the new row always points at the
/// lineage root. Field keys are validated against the fields of `parent_id`.
/// Existing tickets keep referencing the version they were created from.
pub async fn create_version(
    pool: &DbPool,
    actor: &Actor,
    parent_id: DbId,
    name: &str,
    description: Option<&str>,
    fields: &[FieldDefinition],
) -> AppResult<TemplateDetail> {
    let parent = find_template(pool, parent_id).await?;
    if parent.is_deleted() {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Template {parent_id} has been deleted"
        ))));
    }

    let name = validate_template_name(name)?;
    let parent_fields = TemplateRepo::list_fields(pool, parent.id).await?;
    let specs = prepare_version_fields(&parent_fields, fields)?;

    let detail = TemplateRepo::create_version(
        pool,
        &NewTemplate {
            lineage_id: parent.lineage_id,
            parent_id: Some(parent.root_id()),
            name,
            description: normalize_description(description),
            created_by: Some(actor.id),
        },
        &specs,
    )
    .await?;

    tracing::info!(
        template_id = detail.template.id,
        root_id = parent.root_id(),
        user_id = actor.id,
        "Template version created"
    );
    Ok(detail)
}

/// Soft-delete every version of the lineage `template_id` belongs to.
///
/// Returns the number of versions hidden by this call. Tickets referencing
/// those versions are untouched.
pub async fn delete_lineage(pool: &DbPool, actor: &Actor, template_id: DbId) -> AppResult<u64> {
    let template = find_template(pool, template_id).await?;
    let deleted = TemplateRepo::soft_delete_lineage(pool, template.lineage_id).await?;

    tracing::info!(
        template_id,
        lineage_id = %template.lineage_id,
        deleted,
        user_id = actor.id,
        "Template lineage deleted"
    );
    Ok(deleted)
}

pub async fn find_template(pool: &DbPool, id: DbId) -> AppResult<Template> {
    TemplateRepo::find_by_id(pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Template",
            id,
        }))
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}
