//! Task rules that span several tables: pipeline membership of statuses,
//! project-local parents and milestones, and completion side effects.

use db::{
    models::{
        milestone::Milestone,
        pipeline::{Pipeline, Status},
        project::Project,
        task::{CreateTask, Task, UpdateTask},
    },
    validation::ValidationErrors,
};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use utils::nullable;
use uuid::Uuid;

use super::{
    recurring_tasks,
    webhooks::{self, WebhookEvent},
};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

/// A completed task and, for recurring tasks, the occurrence created in its place.
#[derive(Debug, Clone, Serialize, TS)]
pub struct CompletedTask {
    pub task: Task,
    pub next_occurrence: Option<Task>,
}

async fn check_status(
    pool: &SqlitePool,
    errors: &mut ValidationErrors,
    project: &Project,
    status_id: Uuid,
) -> Result<(), sqlx::Error> {
    let valid = match project.pipeline_id {
        Some(pipeline_id) => Pipeline::contains_status(pool, pipeline_id, status_id).await?,
        None => Status::find_by_id(pool, status_id)
            .await?
            .is_some_and(|s| s.workspace_id == project.workspace_id),
    };
    if !valid {
        errors.add("status_id", "The selected status id is not part of the project's pipeline.");
    }
    Ok(())
}

async fn check_milestone(
    pool: &SqlitePool,
    errors: &mut ValidationErrors,
    project: &Project,
    milestone_id: Uuid,
) -> Result<(), sqlx::Error> {
    let valid = Milestone::find_by_id(pool, milestone_id)
        .await?
        .is_some_and(|m| m.project_id == project.id);
    if !valid {
        errors.add("milestone_id", "The selected milestone id is invalid.");
    }
    Ok(())
}

/// Parent must live in the same project and must not sit below `task_id`.
async fn check_parent(
    pool: &SqlitePool,
    errors: &mut ValidationErrors,
    project: &Project,
    task_id: Option<Uuid>,
    parent_id: Uuid,
) -> Result<(), sqlx::Error> {
    let parent = Task::find_by_id(pool, parent_id).await?;
    if !parent.is_some_and(|p| p.project_id == project.id) {
        errors.add("parent_id", "The selected parent id is invalid.");
        return Ok(());
    }
    if let Some(task_id) = task_id
        && Task::is_ancestor(pool, task_id, parent_id).await?
    {
        errors.add("parent_id", "A task cannot be its own ancestor.");
    }
    Ok(())
}

fn check_text(errors: &mut ValidationErrors, title: Option<&str>, description: Option<&str>) {
    if let Some(title) = title {
        errors.required("title", title);
        errors.max_len("title", title, 255);
    }
    if let Some(description) = description {
        errors.max_len("description", description, 65_535);
    }
}

pub async fn create_task(
    pool: &SqlitePool,
    project: &Project,
    data: &CreateTask,
) -> Result<Task, TaskError> {
    let mut errors = ValidationErrors::new();
    check_text(&mut errors, Some(&data.title), data.description.as_deref());
    if let Some(status_id) = data.status_id {
        check_status(pool, &mut errors, project, status_id).await?;
    }
    if let Some(milestone_id) = data.milestone_id {
        check_milestone(pool, &mut errors, project, milestone_id).await?;
    }
    if let Some(parent_id) = data.parent_id {
        check_parent(pool, &mut errors, project, None, parent_id).await?;
    }
    errors.into_result()?;

    let mut data = data.clone();
    if data.status_id.is_none()
        && let Some(pipeline_id) = project.pipeline_id
    {
        data.status_id = Pipeline::first_status(pool, pipeline_id).await?.map(|s| s.id);
    }

    let task = Task::create(pool, project.id, &data).await?;
    info!(task_id = %task.id, project_id = %project.id, "Task created");
    webhooks::emit(pool, project.workspace_id, WebhookEvent::TaskCreated, &task).await;
    Ok(task)
}

pub async fn update_task(
    pool: &SqlitePool,
    project: &Project,
    task: &Task,
    data: &UpdateTask,
) -> Result<Task, TaskError> {
    let mut errors = ValidationErrors::new();
    check_text(
        &mut errors,
        data.title.as_deref(),
        nullable::value(&data.description).map(String::as_str),
    );
    if let Some(status_id) = data.status_id {
        check_status(pool, &mut errors, project, status_id).await?;
    }
    if let Some(milestone_id) = nullable::value(&data.milestone_id) {
        check_milestone(pool, &mut errors, project, *milestone_id).await?;
    }
    if let Some(parent_id) = nullable::value(&data.parent_id) {
        check_parent(pool, &mut errors, project, Some(task.id), *parent_id).await?;
    }
    errors.into_result()?;

    let task = Task::update(pool, task.id, data).await?;
    webhooks::emit(pool, project.workspace_id, WebhookEvent::TaskUpdated, &task).await;
    Ok(task)
}

/// Complete a task, moving it to the pipeline's completed status when there is one.
/// Completing an already completed task changes nothing.
pub async fn complete_task(
    pool: &SqlitePool,
    project: &Project,
    task: &Task,
) -> Result<CompletedTask, TaskError> {
    if task.is_completed() {
        return Ok(CompletedTask {
            task: task.clone(),
            next_occurrence: None,
        });
    }

    let (completed_status, first_status) = match project.pipeline_id {
        Some(pipeline_id) => (
            Pipeline::completed_status(pool, pipeline_id).await?.map(|s| s.id),
            Pipeline::first_status(pool, pipeline_id).await?.map(|s| s.id),
        ),
        None => (None, None),
    };

    let outcome =
        recurring_tasks::complete_occurrence(pool, project, task, completed_status, first_status)
            .await?;

    info!(
        task_id = %task.id,
        next_occurrence = ?outcome.next_occurrence.as_ref().map(|t| t.id),
        "Task completed"
    );
    webhooks::emit(pool, project.workspace_id, WebhookEvent::TaskCompleted, &outcome.task).await;
    if let Some(next) = &outcome.next_occurrence {
        webhooks::emit(pool, project.workspace_id, WebhookEvent::TaskCreated, next).await;
    }
    Ok(outcome)
}

/// Reopen a task. A task sitting in a completed status goes back to the first status.
pub async fn reopen_task(
    pool: &SqlitePool,
    project: &Project,
    task: &Task,
) -> Result<Task, TaskError> {
    let mut status_id = None;
    if let Some(pipeline_id) = project.pipeline_id
        && let Some(current) = task.status_id
        && Status::find_by_id(pool, current)
            .await?
            .is_some_and(|s| s.is_completed)
    {
        status_id = Pipeline::first_status(pool, pipeline_id).await?.map(|s| s.id);
    }

    let task = Task::set_completed(pool, task.id, false, status_id).await?;
    webhooks::emit(pool, project.workspace_id, WebhookEvent::TaskUpdated, &task).await;
    Ok(task)
}

/// Soft-delete a task and its subtasks.
pub async fn delete_task(pool: &SqlitePool, project: &Project, task: &Task) -> Result<u64, TaskError> {
    let deleted = Task::soft_delete(pool, task.id).await?;
    info!(task_id = %task.id, deleted, "Task deleted");
    webhooks::emit(pool, project.workspace_id, WebhookEvent::TaskDeleted, task).await;
    Ok(deleted)
}
