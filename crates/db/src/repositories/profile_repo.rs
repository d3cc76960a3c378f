//! Repository for the `profiles` table.

use autocrm_core::roles::{ROLE_ADMIN, ROLE_AGENT};
use autocrm_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::profile::{AgentSummary, CreateProfile, Profile};

/// Column list for `profiles` queries.
const COLUMNS: &str = "id, name, email, password_hash, role, created_at, updated_at";

/// Provides CRUD operations for profiles.
pub struct ProfileRepo;

impl ProfileRepo {
    /// Insert a new profile. Fails with `uq_profiles_email` on a duplicate
    /// (case-insensitive) email.
    pub async fn create(pool: &PgPool, input: &CreateProfile) -> Result<Profile, sqlx::Error> {
        let query = format!(
            "INSERT INTO profiles (name, email, password_hash, role) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Profile>(&query)
            .bind(&input.name)
            .bind(&input.email)
            .bind(&input.password_hash)
            .bind(input.role.as_str())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Profile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM profiles WHERE id = $1");
        sqlx::query_as::<_, Profile>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Profile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM profiles WHERE LOWER(email) = LOWER($1)");
        sqlx::query_as::<_, Profile>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Agents and admins that can log in, ordered by name.
    pub async fn list_agents(pool: &PgPool) -> Result<Vec<AgentSummary>, sqlx::Error> {
        sqlx::query_as::<_, AgentSummary>(
            "SELECT id, name, email, role FROM profiles \
             WHERE role IN ($1, $2) AND password_hash IS NOT NULL \
             ORDER BY name ASC, id ASC",
        )
        .bind(ROLE_AGENT)
        .bind(ROLE_ADMIN)
        .fetch_all(pool)
        .await
    }

    /// Display names of the given profiles.
    pub async fn find_names(
        pool: &PgPool,
        ids: &[DbId],
    ) -> Result<Vec<(DbId, String)>, sqlx::Error> {
        sqlx::query_as::<_, (DbId, String)>("SELECT id, name FROM profiles WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Roles of the given profiles, read inside the update transaction so
    /// reference fields are validated against the same snapshot.
    pub async fn find_roles(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[DbId],
    ) -> Result<Vec<(DbId, String)>, sqlx::Error> {
        sqlx::query_as::<_, (DbId, String)>("SELECT id, role FROM profiles WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut **tx)
            .await
    }
}
