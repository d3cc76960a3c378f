use sqlx::PgPool;

/// Full bootstrap test: connect, migrate, verify seed data.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_full_bootstrap(pool: PgPool) {
    autocrm_db::health_check(&pool).await.unwrap();

    for table in [
        "profiles",
        "ticket_templates",
        "template_fields",
        "tickets",
        "ticket_updates",
        "teams",
        "team_members",
        "team_embeddings",
    ] {
        sqlx::query(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
    }
}

/// The triage actor is seeded as an agent without a password.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_triage_bot_is_seeded(pool: PgPool) {
    let bot = autocrm_db::repositories::ProfileRepo::find_by_email(&pool, "triagebot@autocrm.local")
        .await
        .unwrap()
        .expect("triage bot profile");
    assert_eq!(bot.role, "agent");
    assert!(bot.password_hash.is_none());
}

/// Verify pgvector extension is available.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_pgvector_available(pool: PgPool) {
    let result: (String,) = sqlx::query_as("SELECT '[1,2,3]'::vector::text")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(result.0, "[1,2,3]");
}

/// Unknown roles are rejected by `ck_profiles_role`.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_profile_role_is_constrained(pool: PgPool) {
    let result = sqlx::query(
        "INSERT INTO profiles (name, email, role) VALUES ('X', 'x@example.com', 'owner')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}
