//! Pipelines and statuses.
//!
//! A pipeline is an ordered list of statuses stored in `pipeline_statuses`.
//! Positions are kept dense (`0..n-1`) by every operation that changes membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use ts_rs::TS;
use utils::nullable::{self, Nullable};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Pipeline {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Status {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    /// Hex color code (e.g., "#3b82f6")
    pub color: String,
    /// Tasks moved into this status count as completed
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A status as it appears inside a pipeline.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct OrderedStatus {
    #[sqlx(flatten)]
    #[serde(flatten)]
    #[ts(flatten)]
    pub status: Status,
    pub position: i64,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreatePipeline {
    pub name: String,
    pub description: Option<String>,
    /// Statuses to attach, in order
    #[serde(default)]
    pub status_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdatePipeline {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub description: Nullable<String>,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateStatus {
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateStatus {
    pub name: Option<String>,
    pub color: Option<String>,
    pub is_completed: Option<bool>,
}

#[derive(Debug, Deserialize, TS)]
pub struct AttachStatus {
    pub status_id: Uuid,
}

#[derive(Debug, Deserialize, TS)]
pub struct ReorderStatuses {
    pub status_ids: Vec<Uuid>,
}

fn default_color() -> String {
    "#6b7280".to_string()
}

const PIPELINE_COLUMNS: &str = "id, workspace_id, name, description, created_at, updated_at";
const STATUS_COLUMNS: &str = "id, workspace_id, name, color, is_completed, created_at, updated_at";

impl Pipeline {
    pub async fn create(
        conn: &mut SqliteConnection,
        workspace_id: Uuid,
        data: &CreatePipeline,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Pipeline>(&format!(
            "INSERT INTO pipelines (id, workspace_id, name, description) VALUES ($1, $2, $3, $4)
             RETURNING {PIPELINE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(&data.name)
        .bind(&data.description)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Pipeline>(&format!(
            "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_workspace(
        pool: &SqlitePool,
        workspace_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Pipeline>(&format!(
            "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE workspace_id = $1 ORDER BY name ASC"
        ))
        .bind(workspace_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdatePipeline,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        let name = data.name.as_ref().unwrap_or(&existing.name);
        let description = nullable::apply(&data.description, &existing.description);

        sqlx::query_as::<_, Pipeline>(&format!(
            "UPDATE pipelines SET name = $2, description = $3, updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {PIPELINE_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pipelines WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Statuses of the pipeline in position order.
    pub async fn statuses(
        conn: &mut SqliteConnection,
        pipeline_id: Uuid,
    ) -> Result<Vec<OrderedStatus>, sqlx::Error> {
        sqlx::query_as::<_, OrderedStatus>(
            r#"SELECT s.id, s.workspace_id, s.name, s.color, s.is_completed, s.created_at,
                      s.updated_at, ps.position
            FROM pipeline_statuses ps
            INNER JOIN statuses s ON s.id = ps.status_id
            WHERE ps.pipeline_id = $1
            ORDER BY ps.position ASC, s.name ASC"#,
        )
        .bind(pipeline_id)
        .fetch_all(conn)
        .await
    }

    pub async fn status_ids(
        conn: &mut SqliteConnection,
        pipeline_id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT status_id FROM pipeline_statuses WHERE pipeline_id = $1 ORDER BY position ASC",
        )
        .bind(pipeline_id)
        .fetch_all(conn)
        .await
    }

    pub async fn contains_status(
        pool: &SqlitePool,
        pipeline_id: Uuid,
        status_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM pipeline_statuses WHERE pipeline_id = $1 AND status_id = $2)",
        )
        .bind(pipeline_id)
        .bind(status_id)
        .fetch_one(pool)
        .await
    }

    /// Append a status at the end of the pipeline. Returns `false` if it was already attached.
    pub async fn attach_status(
        conn: &mut SqliteConnection,
        pipeline_id: Uuid,
        status_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"INSERT INTO pipeline_statuses (pipeline_id, status_id, position)
            SELECT $1, $2, COALESCE(MAX(position) + 1, 0)
            FROM pipeline_statuses
            WHERE pipeline_id = $1
            ON CONFLICT (pipeline_id, status_id) DO NOTHING"#,
        )
        .bind(pipeline_id)
        .bind(status_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a status from the pipeline and close the gap it leaves.
    pub async fn detach_status(
        pool: &SqlitePool,
        pipeline_id: Uuid,
        status_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let removed =
            sqlx::query("DELETE FROM pipeline_statuses WHERE pipeline_id = $1 AND status_id = $2")
                .bind(pipeline_id)
                .bind(status_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        if removed > 0 {
            Self::compact_positions(&mut tx, pipeline_id).await?;
        }
        tx.commit().await?;
        Ok(removed > 0)
    }

    /// Rewrite positions so that `status_ids[i]` sits at position `i`.
    ///
    /// The caller guarantees `status_ids` is exactly the attached set.
    pub async fn write_order(
        conn: &mut SqliteConnection,
        pipeline_id: Uuid,
        status_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        for (position, status_id) in status_ids.iter().enumerate() {
            sqlx::query(
                "UPDATE pipeline_statuses SET position = $3 WHERE pipeline_id = $1 AND status_id = $2",
            )
            .bind(pipeline_id)
            .bind(status_id)
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Renumber the current order to `0..n-1`.
    pub async fn compact_positions(
        conn: &mut SqliteConnection,
        pipeline_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        let ordered = Self::status_ids(conn, pipeline_id).await?;
        Self::write_order(conn, pipeline_id, &ordered).await
    }

    /// Status new tasks start in.
    pub async fn first_status(
        pool: &SqlitePool,
        pipeline_id: Uuid,
    ) -> Result<Option<Status>, sqlx::Error> {
        sqlx::query_as::<_, Status>(
            r#"SELECT s.id, s.workspace_id, s.name, s.color, s.is_completed, s.created_at, s.updated_at
            FROM pipeline_statuses ps
            INNER JOIN statuses s ON s.id = ps.status_id
            WHERE ps.pipeline_id = $1
            ORDER BY ps.position ASC
            LIMIT 1"#,
        )
        .bind(pipeline_id)
        .fetch_optional(pool)
        .await
    }

    /// First completed-flagged status in pipeline order.
    pub async fn completed_status(
        pool: &SqlitePool,
        pipeline_id: Uuid,
    ) -> Result<Option<Status>, sqlx::Error> {
        sqlx::query_as::<_, Status>(
            r#"SELECT s.id, s.workspace_id, s.name, s.color, s.is_completed, s.created_at, s.updated_at
            FROM pipeline_statuses ps
            INNER JOIN statuses s ON s.id = ps.status_id
            WHERE ps.pipeline_id = $1 AND s.is_completed = 1
            ORDER BY ps.position ASC
            LIMIT 1"#,
        )
        .bind(pipeline_id)
        .fetch_optional(pool)
        .await
    }
}

impl Status {
    pub async fn create(
        pool: &SqlitePool,
        workspace_id: Uuid,
        data: &CreateStatus,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Status>(&format!(
            "INSERT INTO statuses (id, workspace_id, name, color, is_completed)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {STATUS_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(&data.name)
        .bind(&data.color)
        .bind(data.is_completed)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Status>(&format!(
            "SELECT {STATUS_COLUMNS} FROM statuses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_workspace(
        pool: &SqlitePool,
        workspace_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Status>(&format!(
            "SELECT {STATUS_COLUMNS} FROM statuses WHERE workspace_id = $1 ORDER BY name ASC"
        ))
        .bind(workspace_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateStatus,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        let name = data.name.as_ref().unwrap_or(&existing.name);
        let color = data.color.as_ref().unwrap_or(&existing.color);
        let is_completed = data.is_completed.unwrap_or(existing.is_completed);

        sqlx::query_as::<_, Status>(&format!(
            "UPDATE statuses
             SET name = $2, color = $3, is_completed = $4, updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {STATUS_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(color)
        .bind(is_completed)
        .fetch_one(pool)
        .await
    }

    /// Delete a status and compact every pipeline it belonged to.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let pipeline_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT pipeline_id FROM pipeline_statuses WHERE status_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM statuses WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for pipeline_id in pipeline_ids {
            Pipeline::compact_positions(&mut tx, pipeline_id).await?;
        }
        tx.commit().await?;
        Ok(deleted)
    }
}
