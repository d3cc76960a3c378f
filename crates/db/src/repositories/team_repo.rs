//! Repository for the `teams`, `team_members` and `team_embeddings` tables.
//!
//! The `embedding` column uses pgvector's `vector(1536)` type. Vectors are
//! passed as text literals (`'[0.1,0.2,...]'`) and cast in SQL.

use autocrm_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::team::{CreateTeam, Team, TeamMatch, UpdateTeam};

/// Column list for `teams` queries, with members aggregated per team.
const COLUMNS: &str = "\
    t.id, t.name, t.description, \
    ARRAY(SELECT tm.profile_id FROM team_members tm \
          WHERE tm.team_id = t.id ORDER BY tm.profile_id) AS member_ids, \
    t.created_at, t.updated_at";

pub struct TeamRepo;

impl TeamRepo {
    // -----------------------------------------------------------------------
    // Team CRUD
    // -----------------------------------------------------------------------

    /// Create a team with its initial members.
    pub async fn create(pool: &PgPool, input: &CreateTeam) -> Result<Team, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let (id,): (DbId,) = sqlx::query_as(
            "INSERT INTO teams (name, description) VALUES ($1, $2) RETURNING id",
        )
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(&mut *tx)
        .await?;

        Self::replace_members(&mut tx, id, &input.member_ids).await?;
        let team = Self::find_in(&mut tx, id).await?;

        tx.commit().await?;
        Ok(team)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Team>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM teams t WHERE t.id = $1");
        sqlx::query_as::<_, Team>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Team>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM teams t ORDER BY t.name ASC");
        sqlx::query_as::<_, Team>(&query).fetch_all(pool).await
    }

    /// Update a team. Only non-`None` fields are applied.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateTeam,
    ) -> Result<Option<Team>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE teams SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::find_by_id(pool, id).await
    }

    /// Delete a team. Members and embedding cascade.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Replace the member list of a team.
    pub async fn set_members(
        pool: &PgPool,
        id: DbId,
        member_ids: &[DbId],
    ) -> Result<Option<Team>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let exists: Option<(DbId,)> = sqlx::query_as("SELECT id FROM teams WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        Self::replace_members(&mut tx, id, member_ids).await?;
        let team = Self::find_in(&mut tx, id).await?;

        tx.commit().await?;
        Ok(Some(team))
    }

    /// Member profile ids of a team.
    pub async fn list_member_ids(pool: &PgPool, id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "SELECT profile_id FROM team_members WHERE team_id = $1 ORDER BY profile_id",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn replace_members(
        tx: &mut Transaction<'_, Postgres>,
        team_id: DbId,
        member_ids: &[DbId],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM team_members WHERE team_id = $1")
            .bind(team_id)
            .execute(&mut **tx)
            .await?;

        for &profile_id in member_ids {
            sqlx::query(
                "INSERT INTO team_members (team_id, profile_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(team_id)
            .bind(profile_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn find_in(tx: &mut Transaction<'_, Postgres>, id: DbId) -> Result<Team, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM teams t WHERE t.id = $1");
        sqlx::query_as::<_, Team>(&query)
            .bind(id)
            .fetch_one(&mut **tx)
            .await
    }

    // -----------------------------------------------------------------------
    // Embeddings
    // -----------------------------------------------------------------------

    /// Store (or replace) the embedding of a team's document.
    pub async fn upsert_embedding(
        pool: &PgPool,
        team_id: DbId,
        content: &str,
        embedding: &[f32],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO team_embeddings (team_id, content, embedding) \
             VALUES ($1, $2, $3::vector) \
             ON CONFLICT (team_id) DO UPDATE \
             SET content = EXCLUDED.content, embedding = EXCLUDED.embedding",
        )
        .bind(team_id)
        .bind(content)
        .bind(vector_literal(embedding))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Teams ranked by cosine similarity to `embedding`, best first.
    pub async fn search_similar(
        pool: &PgPool,
        embedding: &[f32],
        limit: i64,
    ) -> Result<Vec<TeamMatch>, sqlx::Error> {
        sqlx::query_as::<_, TeamMatch>(
            "SELECT t.id, t.name, t.description, \
                    (1 - (e.embedding <=> $1::vector))::float8 AS similarity \
             FROM team_embeddings e \
             JOIN teams t ON t.id = e.team_id \
             ORDER BY e.embedding <=> $1::vector ASC \
             LIMIT $2",
        )
        .bind(vector_literal(embedding))
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

/// Format a vector as a pgvector text literal.
fn vector_literal(values: &[f32]) -> String {
    format!(
        "[{}]",
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_is_bracketed_and_comma_separated() {
        assert_eq!(vector_literal(&[0.5, -1.0, 2.25]), "[0.5,-1,2.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }
}
