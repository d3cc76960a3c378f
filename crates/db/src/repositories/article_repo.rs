//! Repository for the `articles` table.

use autocrm_core::types::DbId;
use sqlx::PgPool;

use crate::models::article::{Article, CreateArticle, UpdateArticle};

/// Column list for `articles` queries, with author names joined in.
const COLUMNS: &str = "\
    a.id, a.title, a.content, \
    a.created_by, cp.name AS created_by_name, \
    a.updated_by, up.name AS updated_by_name, \
    a.created_at, a.updated_at";

const FROM: &str = "\
    articles a \
    LEFT JOIN profiles cp ON cp.id = a.created_by \
    LEFT JOIN profiles up ON up.id = a.updated_by";

pub struct ArticleRepo;

impl ArticleRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateArticle,
        author: DbId,
    ) -> Result<Article, sqlx::Error> {
        let (id,): (DbId,) = sqlx::query_as(
            "INSERT INTO articles (title, content, created_by, updated_by) \
             VALUES ($1, $2, $3, $3) RETURNING id",
        )
        .bind(&input.title)
        .bind(&input.content)
        .bind(author)
        .fetch_one(pool)
        .await?;

        let query = format!("SELECT {COLUMNS} FROM {FROM} WHERE a.id = $1");
        sqlx::query_as::<_, Article>(&query)
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Article>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {FROM} WHERE a.id = $1");
        sqlx::query_as::<_, Article>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Every article, newest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Article>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {FROM} ORDER BY a.created_at DESC, a.id DESC");
        sqlx::query_as::<_, Article>(&query).fetch_all(pool).await
    }

    /// Update an article. Only non-`None` fields are applied; the editor is
    /// always recorded.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateArticle,
        editor: DbId,
    ) -> Result<Option<Article>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE articles SET \
                title = COALESCE($2, title), \
                content = COALESCE($3, content), \
                updated_by = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.content)
        .bind(editor)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::find_by_id(pool, id).await
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
