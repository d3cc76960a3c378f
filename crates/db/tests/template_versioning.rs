//! Integration tests for insert-only template versioning.

use autocrm_core::field::FieldType;
use autocrm_core::template::{prepare_root_fields, prepare_version_fields, FieldDefinition};
use autocrm_db::models::template::{NewTemplate, TemplateDetail};
use autocrm_db::repositories::TemplateRepo;
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn def(name: &str, field_type: FieldType, rank: i32) -> FieldDefinition {
    FieldDefinition {
        key: None,
        name: name.to_string(),
        field_type,
        description: None,
        required: false,
        rank,
        default_value: None,
        choices: Vec::new(),
        visible_to_customer: true,
        editable_by_customer: false,
    }
}

async fn create_root(pool: &PgPool, name: &str) -> TemplateDetail {
    let specs = prepare_root_fields(&[def("Order number", FieldType::Text, 0)]).unwrap();
    TemplateRepo::create_version(
        pool,
        &NewTemplate {
            lineage_id: Uuid::new_v4(),
            parent_id: None,
            name: name.to_string(),
            description: None,
            created_by: None,
        },
        &specs,
    )
    .await
    .unwrap()
}

async fn create_next(pool: &PgPool, parent: &TemplateDetail, extra: &str) -> TemplateDetail {
    let mut defs: Vec<FieldDefinition> = parent
        .fields
        .iter()
        .map(|f| FieldDefinition {
            key: Some(f.key),
            name: f.name.clone(),
            field_type: f.field_type,
            description: f.description.clone(),
            required: f.required,
            rank: f.rank,
            default_value: f.default_value.clone(),
            choices: f.choices.clone(),
            visible_to_customer: f.visible_to_customer,
            editable_by_customer: f.editable_by_customer,
        })
        .collect();
    let rank = defs.iter().map(|d| d.rank).max().unwrap() + 1;
    defs.push(def(extra, FieldType::Text, rank));

    let specs = prepare_version_fields(&parent.fields, &defs).unwrap();
    TemplateRepo::create_version(
        pool,
        &NewTemplate {
            lineage_id: parent.template.lineage_id,
            parent_id: Some(parent.template.root_id()),
            name: parent.template.name.clone(),
            description: None,
            created_by: None,
        },
        &specs,
    )
    .await
    .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn root_template_gets_system_fields(pool: PgPool) {
    let root = create_root(&pool, "Returns").await;

    assert_eq!(root.template.parent_id, None);
    let names: Vec<&str> = root.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["Order number", "Assigned To", "Status", "Priority"]);
    assert_eq!(root.fields.iter().filter(|f| f.is_default).count(), 3);

    let reloaded = TemplateRepo::find_detail(&pool, root.template.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.fields, root.fields);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn versions_point_at_the_lineage_root(pool: PgPool) {
    let v1 = create_root(&pool, "Returns").await;
    let v2 = create_next(&pool, &v1, "Reason").await;
    let v3 = create_next(&pool, &v2, "Carrier").await;

    assert_eq!(v2.template.parent_id, Some(v1.template.id));
    assert_eq!(v3.template.parent_id, Some(v1.template.id));
    assert_eq!(v3.template.lineage_id, v1.template.lineage_id);

    // System field keys survive versioning.
    let status_key = |d: &TemplateDetail| d.fields.iter().find(|f| f.name == "Status").unwrap().key;
    assert_eq!(status_key(&v1), status_key(&v3));

    // Earlier versions are untouched.
    let v1_fields = TemplateRepo::list_fields(&pool, v1.template.id).await.unwrap();
    assert_eq!(v1_fields.len(), 4);

    let history = TemplateRepo::list_history(&pool, v1.template.lineage_id)
        .await
        .unwrap();
    let ids: Vec<i64> = history.iter().map(|t| t.id).collect();
    assert_eq!(ids, [v3.template.id, v2.template.id, v1.template.id]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_latest_returns_one_row_per_lineage(pool: PgPool) {
    let a1 = create_root(&pool, "Returns").await;
    let a2 = create_next(&pool, &a1, "Reason").await;
    let b1 = create_root(&pool, "Billing").await;

    let latest = TemplateRepo::list_latest(&pool, false).await.unwrap();
    let ids: Vec<i64> = latest.iter().map(|t| t.id).collect();
    assert_eq!(ids, [b1.template.id, a2.template.id]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn soft_delete_hides_the_whole_lineage(pool: PgPool) {
    let a1 = create_root(&pool, "Returns").await;
    let a2 = create_next(&pool, &a1, "Reason").await;

    let deleted = TemplateRepo::soft_delete_lineage(&pool, a1.template.lineage_id)
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    assert!(TemplateRepo::list_latest(&pool, false).await.unwrap().is_empty());
    let all = TemplateRepo::list_latest(&pool, true).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, a2.template.id);

    // Rows are retained for historical tickets.
    let row = TemplateRepo::find_by_id(&pool, a1.template.id).await.unwrap().unwrap();
    assert!(row.is_deleted());

    // Deleting again touches nothing.
    let again = TemplateRepo::soft_delete_lineage(&pool, a1.template.lineage_id)
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn template_fields_are_immutable_and_rank_unique(pool: PgPool) {
    let root = create_root(&pool, "Returns").await;
    let field = &root.fields[0];

    let update = sqlx::query("UPDATE template_fields SET name = 'Renamed' WHERE id = $1")
        .bind(field.id)
        .execute(&pool)
        .await;
    assert!(update.is_err());

    let duplicate_rank = sqlx::query(
        "INSERT INTO template_fields (template_id, field_key, name, field_type, rank) \
         VALUES ($1, $2, 'Dup', 'text', $3)",
    )
    .bind(root.template.id)
    .bind(Uuid::new_v4())
    .bind(field.rank)
    .execute(&pool)
    .await;
    let err = duplicate_rank.unwrap_err();
    let constraint = err
        .as_database_error()
        .and_then(|e| e.constraint())
        .map(str::to_string);
    assert_eq!(constraint.as_deref(), Some("uq_template_fields_rank"));
}
