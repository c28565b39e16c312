//! Tasks belong to a project and form a tree through `parent_id`.
//!
//! Soft-deleted tasks (`deleted_at IS NOT NULL`) are invisible to every query here.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use utils::{
    nullable::{self, Nullable},
    pagination::Page,
};
use uuid::Uuid;

mod hierarchy;
pub mod recurrence;

pub use recurrence::{Frequency, TaskRecurrence, UpsertRecurrence, Weekday};

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
    Default,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub status_id: Option<Uuid>,
    pub milestone_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_on: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub status_id: Option<Uuid>,
    pub milestone_id: Option<Uuid>,
    #[serde(default)]
    pub priority: TaskPriority,
    pub due_on: Option<NaiveDate>,
}

/// Absent fields are left alone; `null` clears a nullable column.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub description: Nullable<String>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub parent_id: Nullable<Uuid>,
    pub status_id: Option<Uuid>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub milestone_id: Nullable<Uuid>,
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub due_on: Nullable<NaiveDate>,
}

/// Listing filters for `GET /projects/{id}/tasks`.
#[derive(Debug, Clone, Deserialize, TS)]
pub struct TaskFilter {
    pub status_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    /// Only tasks without a parent
    #[serde(default)]
    pub top_level_only: bool,
    #[serde(default = "default_include_completed")]
    pub include_completed: bool,
}

fn default_include_completed() -> bool {
    true
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            status_id: None,
            parent_id: None,
            top_level_only: false,
            include_completed: true,
        }
    }
}

pub(crate) const TASK_COLUMNS: &str = "id, project_id, parent_id, status_id, milestone_id, title, \
     description, priority, due_on, completed_at, created_at, updated_at";

impl Task {
    pub async fn create<'e, E>(
        executor: E,
        project_id: Uuid,
        data: &CreateTask,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (id, project_id, parent_id, status_id, milestone_id, title, description, priority, due_on)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(data.parent_id)
        .bind(data.status_id)
        .bind(data.milestone_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.priority)
        .bind(data.due_on)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// One page of a project's tasks plus the total matching count.
    pub async fn list_for_project(
        pool: &SqlitePool,
        project_id: Uuid,
        filter: &TaskFilter,
        page: Page,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tasks");
        push_filter(&mut count, project_id, filter);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {TASK_COLUMNS} FROM tasks"));
        push_filter(&mut builder, project_id, filter);
        builder.push(" ORDER BY created_at ASC, id ASC LIMIT ");
        builder.push_bind(page.limit());
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());
        let tasks = builder.build_query_as::<Task>().fetch_all(pool).await?;

        Ok((tasks, total))
    }

    /// Apply only the provided fields.
    pub async fn update(pool: &SqlitePool, id: Uuid, data: &UpdateTask) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks
             SET title = $2, description = $3, parent_id = $4, status_id = $5, milestone_id = $6,
                 priority = $7, due_on = $8, updated_at = datetime('now', 'subsec')
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(data.title.as_ref().unwrap_or(&existing.title))
        .bind(nullable::apply(&data.description, &existing.description))
        .bind(nullable::apply(&data.parent_id, &existing.parent_id).copied())
        .bind(data.status_id.or(existing.status_id))
        .bind(nullable::apply(&data.milestone_id, &existing.milestone_id).copied())
        .bind(data.priority.unwrap_or(existing.priority))
        .bind(nullable::apply(&data.due_on, &existing.due_on).copied())
        .fetch_one(pool)
        .await
    }

    /// Mark complete or reopen. A `status_id` also moves the task to that status.
    pub async fn set_completed<'e, E>(
        executor: E,
        id: Uuid,
        completed: bool,
        status_id: Option<Uuid>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let completed_expr = if completed {
            "COALESCE(completed_at, datetime('now', 'subsec'))"
        } else {
            "NULL"
        };
        sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks
             SET completed_at = {completed_expr},
                 status_id = COALESCE($2, status_id),
                 updated_at = datetime('now', 'subsec')
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(status_id)
        .fetch_one(executor)
        .await
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, project_id: Uuid, filter: &TaskFilter) {
    builder.push(" WHERE deleted_at IS NULL AND project_id = ");
    builder.push_bind(project_id);
    if let Some(status_id) = filter.status_id {
        builder.push(" AND status_id = ");
        builder.push_bind(status_id);
    }
    if let Some(parent_id) = filter.parent_id {
        builder.push(" AND parent_id = ");
        builder.push_bind(parent_id);
    } else if filter.top_level_only {
        builder.push(" AND parent_id IS NULL");
    }
    if !filter.include_completed {
        builder.push(" AND completed_at IS NULL");
    }
}
