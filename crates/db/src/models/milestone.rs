use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use utils::nullable::{self, Nullable};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Milestone {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub due_on: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateMilestone {
    pub name: String,
    pub description: Option<String>,
    pub due_on: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, TS)]
pub struct UpdateMilestone {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub description: Nullable<String>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub due_on: Nullable<NaiveDate>,
}

const MILESTONE_COLUMNS: &str =
    "id, project_id, name, description, due_on, completed_at, created_at, updated_at";

impl Milestone {
    pub async fn create(
        pool: &SqlitePool,
        project_id: Uuid,
        data: &CreateMilestone,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Milestone>(&format!(
            "INSERT INTO milestones (id, project_id, name, description, due_on)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {MILESTONE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(data.due_on)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Milestone>(&format!(
            "SELECT {MILESTONE_COLUMNS} FROM milestones WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Milestones of a project ordered by due date (undated last).
    pub async fn find_by_project(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Milestone>(&format!(
            "SELECT {MILESTONE_COLUMNS} FROM milestones
             WHERE project_id = $1
             ORDER BY due_on IS NULL, due_on ASC, created_at ASC"
        ))
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateMilestone,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        let name = data.name.as_ref().unwrap_or(&existing.name);
        let description = nullable::apply(&data.description, &existing.description);
        let due_on = nullable::apply(&data.due_on, &existing.due_on).copied();

        sqlx::query_as::<_, Milestone>(&format!(
            "UPDATE milestones
             SET name = $2, description = $3, due_on = $4, updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {MILESTONE_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(due_on)
        .fetch_one(pool)
        .await
    }

    pub async fn set_completed(
        pool: &SqlitePool,
        id: Uuid,
        completed: bool,
    ) -> Result<Self, sqlx::Error> {
        let completed_expr = if completed {
            "COALESCE(completed_at, datetime('now', 'subsec'))"
        } else {
            "NULL"
        };
        sqlx::query_as::<_, Milestone>(&format!(
            "UPDATE milestones
             SET completed_at = {completed_expr}, updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {MILESTONE_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM milestones WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
