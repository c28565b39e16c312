//! Projects live inside a workspace and optionally follow a pipeline.
//!
//! Deletion is soft: `deleted_at` is set and the project (with its tasks) drops
//! out of every lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use utils::{
    nullable::{self, Nullable},
    pagination::Page,
};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Project {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub pipeline_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    pub pipeline_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, TS)]
pub struct UpdateProject {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub description: Nullable<String>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub pipeline_id: Nullable<Uuid>,
}

#[derive(Debug, Default, Deserialize, TS)]
pub struct ProjectFilter {
    #[serde(default)]
    pub include_archived: bool,
}

const PROJECT_COLUMNS: &str =
    "id, workspace_id, pipeline_id, name, description, archived_at, created_at, updated_at";

impl Project {
    pub async fn create(
        pool: &SqlitePool,
        workspace_id: Uuid,
        data: &CreateProject,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "INSERT INTO projects (id, workspace_id, pipeline_id, name, description)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(data.pipeline_id)
        .bind(&data.name)
        .bind(&data.description)
        .fetch_one(pool)
        .await
    }

    /// Find a live (not soft-deleted) project.
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// One page of a workspace's projects, newest first, plus the total count.
    pub async fn list_for_workspace(
        pool: &SqlitePool,
        workspace_id: Uuid,
        filter: &ProjectFilter,
        page: Page,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let archived_clause = if filter.include_archived {
            ""
        } else {
            "AND archived_at IS NULL"
        };

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM projects
             WHERE workspace_id = $1 AND deleted_at IS NULL {archived_clause}"
        ))
        .bind(workspace_id)
        .fetch_one(pool)
        .await?;

        let projects = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE workspace_id = $1 AND deleted_at IS NULL {archived_clause}
             ORDER BY created_at DESC, id ASC
             LIMIT $2 OFFSET $3"
        ))
        .bind(workspace_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        Ok((projects, total))
    }

    /// Apply only the provided fields.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateProject,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        let name = data.name.as_ref().unwrap_or(&existing.name);
        let description = nullable::apply(&data.description, &existing.description);
        let pipeline_id = nullable::apply(&data.pipeline_id, &existing.pipeline_id).copied();

        sqlx::query_as::<_, Project>(&format!(
            "UPDATE projects
             SET name = $2, description = $3, pipeline_id = $4, updated_at = datetime('now', 'subsec')
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(pipeline_id)
        .fetch_one(pool)
        .await
    }

    pub async fn set_archived(
        pool: &SqlitePool,
        id: Uuid,
        archived: bool,
    ) -> Result<Self, sqlx::Error> {
        let sql = if archived {
            format!(
                "UPDATE projects
                 SET archived_at = COALESCE(archived_at, datetime('now', 'subsec')),
                     updated_at = datetime('now', 'subsec')
                 WHERE id = $1 AND deleted_at IS NULL
                 RETURNING {PROJECT_COLUMNS}"
            )
        } else {
            format!(
                "UPDATE projects
                 SET archived_at = NULL, updated_at = datetime('now', 'subsec')
                 WHERE id = $1 AND deleted_at IS NULL
                 RETURNING {PROJECT_COLUMNS}"
            )
        };
        sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// Soft-delete the project and its tasks.
    pub async fn soft_delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let deleted = sqlx::query(
            "UPDATE projects SET deleted_at = datetime('now', 'subsec')
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if deleted > 0 {
            sqlx::query(
                "UPDATE tasks SET deleted_at = datetime('now', 'subsec')
                 WHERE project_id = $1 AND deleted_at IS NULL",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(deleted)
    }
}
