//! Recurring tasks: rule storage and spawning the next occurrence on completion.

use chrono::{NaiveDate, Utc};
use db::models::{
    project::Project,
    task::{CreateTask, Task, TaskRecurrence, UpsertRecurrence},
};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;
use ts_rs::TS;

use super::{
    recurrence::RecurrenceRule,
    tasks::{CompletedTask, TaskError},
};

#[derive(Debug, Clone, Serialize, TS)]
pub struct RecurrencePreview {
    pub recurrence: TaskRecurrence,
    pub dates: Vec<NaiveDate>,
}

/// Attach or replace the task's rule. The current occurrence is the task's due
/// date when it fits the rule window, otherwise the rule's first date.
pub async fn upsert_recurrence(
    pool: &SqlitePool,
    task: &Task,
    data: &UpsertRecurrence,
) -> Result<TaskRecurrence, TaskError> {
    let rule = RecurrenceRule::from_request(data)?;
    let current_due = task
        .due_on
        .filter(|due| *due >= rule.starts_on)
        .or_else(|| rule.first_occurrence());
    Ok(TaskRecurrence::upsert(pool, task.id, data, current_due).await?)
}

/// The next `count` due dates after the current occurrence.
pub async fn preview(
    pool: &SqlitePool,
    task: &Task,
    count: usize,
) -> Result<Option<RecurrencePreview>, TaskError> {
    let Some(recurrence) = TaskRecurrence::find_by_task(pool, task.id).await? else {
        return Ok(None);
    };
    let rule = RecurrenceRule::from_stored(&recurrence);
    let anchor = anchor_for(&recurrence, task, &rule);
    let so_far = u32::try_from(recurrence.occurrences_count).unwrap_or(0);
    let dates = rule.preview(anchor, so_far, count);
    Ok(Some(RecurrencePreview { recurrence, dates }))
}

fn anchor_for(recurrence: &TaskRecurrence, task: &Task, rule: &RecurrenceRule) -> NaiveDate {
    recurrence
        .next_due_on
        .or(task.due_on)
        .unwrap_or_else(|| rule.starts_on.max(Utc::now().date_naive()))
}

/// Mark `task` complete and, when it recurs, create the following occurrence
/// and hand the rule over to it. Runs in one transaction.
pub(crate) async fn complete_occurrence(
    pool: &SqlitePool,
    project: &Project,
    task: &Task,
    completed_status: Option<uuid::Uuid>,
    first_status: Option<uuid::Uuid>,
) -> Result<CompletedTask, TaskError> {
    let mut tx = pool.begin().await?;
    let completed = Task::set_completed(&mut *tx, task.id, true, completed_status).await?;

    let mut next_occurrence = None;
    if let Some(recurrence) = TaskRecurrence::find_by_task(&mut *tx, task.id).await? {
        let rule = RecurrenceRule::from_stored(&recurrence);
        let anchor = anchor_for(&recurrence, task, &rule);
        let so_far = u32::try_from(recurrence.occurrences_count).unwrap_or(0);

        match rule.next_after(anchor, so_far) {
            Some(due_on) => {
                let next = Task::create(
                    &mut *tx,
                    project.id,
                    &CreateTask {
                        title: task.title.clone(),
                        description: task.description.clone(),
                        parent_id: task.parent_id,
                        status_id: first_status,
                        milestone_id: task.milestone_id,
                        priority: task.priority,
                        due_on: Some(due_on),
                    },
                )
                .await?;
                TaskRecurrence::advance(&mut *tx, recurrence.id, next.id, Some(due_on)).await?;
                debug!(task_id = %task.id, next_task_id = %next.id, %due_on, "Spawned next occurrence");
                next_occurrence = Some(next);
            }
            None => {
                TaskRecurrence::finish(&mut *tx, recurrence.id).await?;
                debug!(task_id = %task.id, "Recurrence exhausted");
            }
        }
    }
    tx.commit().await?;

    Ok(CompletedTask {
        task: completed,
        next_occurrence,
    })
}
