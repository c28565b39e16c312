//! Immutable snapshots of wiki pages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use ts_rs::TS;
use utils::pagination::Page;
use uuid::Uuid;

use super::wiki::Wiki;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct WikiRevision {
    pub id: Uuid,
    pub wiki_id: Uuid,
    pub revision_number: i64,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub author_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Number of stored revisions for one page.
#[derive(Debug, Clone, FromRow, Serialize, TS)]
pub struct RevisionCount {
    pub wiki_id: Uuid,
    pub revisions: i64,
}

const REVISION_COLUMNS: &str =
    "id, wiki_id, revision_number, title, content, summary, author_id, created_at";

impl WikiRevision {
    /// Store the page's current title/content as a new revision.
    ///
    /// Must run in the same transaction as the write to `wikis` it records.
    pub async fn snapshot(
        conn: &mut SqliteConnection,
        wiki: &Wiki,
        summary: Option<&str>,
        author_id: Option<Uuid>,
    ) -> Result<Self, sqlx::Error> {
        let number = Wiki::next_revision(&mut *conn, wiki.id).await?;
        sqlx::query_as::<_, WikiRevision>(&format!(
            "INSERT INTO wiki_revisions (id, wiki_id, revision_number, title, content, summary, author_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {REVISION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(wiki.id)
        .bind(number)
        .bind(&wiki.title)
        .bind(&wiki.content)
        .bind(summary)
        .bind(author_id)
        .fetch_one(&mut *conn)
        .await
    }

    pub async fn find_by_number(
        pool: &SqlitePool,
        wiki_id: Uuid,
        revision_number: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WikiRevision>(&format!(
            "SELECT {REVISION_COLUMNS} FROM wiki_revisions
             WHERE wiki_id = $1 AND revision_number = $2"
        ))
        .bind(wiki_id)
        .bind(revision_number)
        .fetch_optional(pool)
        .await
    }

    /// Newest first.
    pub async fn list_for_wiki(
        pool: &SqlitePool,
        wiki_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let total = Self::count_for_wiki(pool, wiki_id).await?;
        let revisions = sqlx::query_as::<_, WikiRevision>(&format!(
            "SELECT {REVISION_COLUMNS} FROM wiki_revisions
             WHERE wiki_id = $1
             ORDER BY revision_number DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(wiki_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;
        Ok((revisions, total))
    }

    pub async fn count_for_wiki(pool: &SqlitePool, wiki_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM wiki_revisions WHERE wiki_id = $1")
            .bind(wiki_id)
            .fetch_one(pool)
            .await
    }

    pub async fn latest_number(
        pool: &SqlitePool,
        wiki_id: Uuid,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(revision_number) FROM wiki_revisions WHERE wiki_id = $1",
        )
        .bind(wiki_id)
        .fetch_one(pool)
        .await
    }

    /// Delete all but the newest `keep` revisions of a page.
    pub async fn prune(pool: &SqlitePool, wiki_id: Uuid, keep: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM wiki_revisions
             WHERE wiki_id = $1
               AND id NOT IN (
                   SELECT id FROM wiki_revisions
                   WHERE wiki_id = $1
                   ORDER BY revision_number DESC
                   LIMIT $2
               )",
        )
        .bind(wiki_id)
        .bind(keep)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Pages storing more than `keep` revisions.
    pub async fn wikis_exceeding(
        pool: &SqlitePool,
        keep: i64,
    ) -> Result<Vec<RevisionCount>, sqlx::Error> {
        sqlx::query_as::<_, RevisionCount>(
            "SELECT wiki_id, COUNT(*) AS revisions
             FROM wiki_revisions
             GROUP BY wiki_id
             HAVING COUNT(*) > $1
             ORDER BY wiki_id",
        )
        .bind(keep)
        .fetch_all(pool)
        .await
    }
}
