//! Wiki pages. Each page keeps its full edit history in `wiki_revisions`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use ts_rs::TS;
use utils::nullable::{self, Nullable};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Wiki {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    /// Highest revision number issued for this page
    pub current_revision: i64,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateWiki {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub project_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateWiki {
    pub title: Option<String>,
    pub content: Option<String>,
    /// `null` moves the page back to the root
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub parent_id: Nullable<Uuid>,
    /// Edit summary stored on the revision
    pub summary: Option<String>,
}

const WIKI_COLUMNS: &str = "id, workspace_id, project_id, parent_id, title, content, \
     current_revision, created_by, updated_by, created_at, updated_at";

impl Wiki {
    pub async fn create(
        conn: &mut SqliteConnection,
        workspace_id: Uuid,
        data: &CreateWiki,
        author_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Wiki>(&format!(
            "INSERT INTO wikis (id, workspace_id, project_id, parent_id, title, content, created_by, updated_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {WIKI_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(data.project_id)
        .bind(data.parent_id)
        .bind(&data.title)
        .bind(&data.content)
        .bind(author_id)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Wiki>(&format!("SELECT {WIKI_COLUMNS} FROM wikis WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Pages of a workspace. With `parent_id`, only that page's direct children.
    pub async fn list_for_workspace(
        pool: &SqlitePool,
        workspace_id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        match parent_id {
            Some(parent_id) => {
                sqlx::query_as::<_, Wiki>(&format!(
                    "SELECT {WIKI_COLUMNS} FROM wikis
                     WHERE workspace_id = $1 AND parent_id = $2
                     ORDER BY title ASC"
                ))
                .bind(workspace_id)
                .bind(parent_id)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Wiki>(&format!(
                    "SELECT {WIKI_COLUMNS} FROM wikis WHERE workspace_id = $1 ORDER BY title ASC"
                ))
                .bind(workspace_id)
                .fetch_all(pool)
                .await
            }
        }
    }

    /// Overwrite the page body. Revision bookkeeping is the caller's job.
    pub async fn update_content(
        conn: &mut SqliteConnection,
        id: Uuid,
        title: &str,
        content: &str,
        parent_id: Option<Uuid>,
        updated_by: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Wiki>(&format!(
            "UPDATE wikis
             SET title = $2, content = $3, parent_id = $4, updated_by = $5,
                 updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {WIKI_COLUMNS}"
        ))
        .bind(id)
        .bind(title)
        .bind(content)
        .bind(parent_id)
        .bind(updated_by)
        .fetch_one(conn)
        .await
    }

    /// Issue the next revision number for a page.
    pub async fn next_revision(conn: &mut SqliteConnection, id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE wikis SET current_revision = current_revision + 1
             WHERE id = $1
             RETURNING current_revision",
        )
        .bind(id)
        .fetch_one(conn)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM wikis WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// True when `ancestor_id` is `wiki_id` itself or one of its ancestors.
    pub async fn is_ancestor(
        pool: &SqlitePool,
        ancestor_id: Uuid,
        wiki_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "WITH RECURSIVE chain(id, parent_id) AS (
                 SELECT id, parent_id FROM wikis WHERE id = $2
                 UNION
                 SELECT w.id, w.parent_id FROM wikis w JOIN chain c ON w.id = c.parent_id
             )
             SELECT EXISTS(SELECT 1 FROM chain WHERE id = $1)",
        )
        .bind(ancestor_id)
        .bind(wiki_id)
        .fetch_one(pool)
        .await
    }
}
