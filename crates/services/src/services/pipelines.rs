//! Pipeline composition rules on top of the ordered `pipeline_statuses` table.

use std::collections::HashSet;

use db::{
    models::pipeline::{
        CreatePipeline, CreateStatus, OrderedStatus, Pipeline, Status, UpdatePipeline,
        UpdateStatus,
    },
    validation::ValidationErrors,
};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct PipelineWithStatuses {
    #[serde(flatten)]
    #[ts(flatten)]
    pub pipeline: Pipeline,
    pub statuses: Vec<OrderedStatus>,
}

/// `requested` must be a permutation of `current`.
pub fn validate_reorder(current: &[Uuid], requested: &[Uuid]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut seen = HashSet::with_capacity(requested.len());
    for id in requested {
        if !seen.insert(*id) {
            errors.add("status_ids", format!("The status {id} is listed more than once."));
        }
    }
    let current: HashSet<Uuid> = current.iter().copied().collect();
    for id in seen.difference(&current) {
        errors.add("status_ids", format!("The status {id} is not part of this pipeline."));
    }
    if current.difference(&seen).next().is_some() {
        errors.add(
            "status_ids",
            "The status ids field must list every status of the pipeline.",
        );
    }
    errors.into_result()
}

fn validate_name(errors: &mut ValidationErrors, name: &str) {
    errors.required("name", name);
    errors.max_len("name", name, 255);
}

fn validate_color(errors: &mut ValidationErrors, color: &str) {
    let hex = color.strip_prefix('#').unwrap_or("");
    if !(hex.len() == 6 || hex.len() == 3) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        errors.add("color", "The color field must be a hex color such as #3b82f6.");
    }
}

pub async fn with_statuses(
    pool: &SqlitePool,
    pipeline: Pipeline,
) -> Result<PipelineWithStatuses, PipelineError> {
    let mut conn = pool.acquire().await?;
    let statuses = Pipeline::statuses(&mut conn, pipeline.id).await?;
    Ok(PipelineWithStatuses { pipeline, statuses })
}

pub async fn create_pipeline(
    pool: &SqlitePool,
    workspace_id: Uuid,
    data: &CreatePipeline,
) -> Result<PipelineWithStatuses, PipelineError> {
    let mut errors = ValidationErrors::new();
    validate_name(&mut errors, &data.name);
    let mut seen = HashSet::new();
    for status_id in &data.status_ids {
        if !seen.insert(*status_id) {
            errors.add("status_ids", format!("The status {status_id} is listed more than once."));
            continue;
        }
        let belongs = Status::find_by_id(pool, *status_id)
            .await?
            .is_some_and(|s| s.workspace_id == workspace_id);
        if !belongs {
            errors.add("status_ids", format!("The status {status_id} is invalid."));
        }
    }
    errors.into_result()?;

    let mut tx = pool.begin().await?;
    let pipeline = Pipeline::create(&mut tx, workspace_id, data).await?;
    for status_id in &data.status_ids {
        Pipeline::attach_status(&mut tx, pipeline.id, *status_id).await?;
    }
    let statuses = Pipeline::statuses(&mut tx, pipeline.id).await?;
    tx.commit().await?;

    info!(pipeline_id = %pipeline.id, statuses = statuses.len(), "Pipeline created");
    Ok(PipelineWithStatuses { pipeline, statuses })
}

pub async fn update_pipeline(
    pool: &SqlitePool,
    pipeline: &Pipeline,
    data: &UpdatePipeline,
) -> Result<Pipeline, PipelineError> {
    if let Some(name) = &data.name {
        let mut errors = ValidationErrors::new();
        validate_name(&mut errors, name);
        errors.into_result()?;
    }
    Ok(Pipeline::update(pool, pipeline.id, data).await?)
}

/// Append a status of the same workspace to the end of the pipeline.
pub async fn attach_status(
    pool: &SqlitePool,
    pipeline: &Pipeline,
    status_id: Uuid,
) -> Result<Vec<OrderedStatus>, PipelineError> {
    let belongs = Status::find_by_id(pool, status_id)
        .await?
        .is_some_and(|s| s.workspace_id == pipeline.workspace_id);
    if !belongs {
        return Err(ValidationErrors::single("status_id", "The selected status id is invalid.").into());
    }

    let mut conn = pool.acquire().await?;
    Pipeline::attach_status(&mut conn, pipeline.id, status_id).await?;
    Ok(Pipeline::statuses(&mut conn, pipeline.id).await?)
}

pub async fn detach_status(
    pool: &SqlitePool,
    pipeline: &Pipeline,
    status_id: Uuid,
) -> Result<Option<Vec<OrderedStatus>>, PipelineError> {
    if !Pipeline::detach_status(pool, pipeline.id, status_id).await? {
        return Ok(None);
    }
    let mut conn = pool.acquire().await?;
    Ok(Some(Pipeline::statuses(&mut conn, pipeline.id).await?))
}

/// Rewrite positions so the pipeline follows `status_ids`.
pub async fn reorder(
    pool: &SqlitePool,
    pipeline: &Pipeline,
    status_ids: &[Uuid],
) -> Result<Vec<OrderedStatus>, PipelineError> {
    let mut tx = pool.begin().await?;
    let current = Pipeline::status_ids(&mut tx, pipeline.id).await?;
    validate_reorder(&current, status_ids)?;
    Pipeline::write_order(&mut tx, pipeline.id, status_ids).await?;
    let statuses = Pipeline::statuses(&mut tx, pipeline.id).await?;
    tx.commit().await?;

    info!(pipeline_id = %pipeline.id, "Pipeline statuses reordered");
    Ok(statuses)
}

pub async fn create_status(
    pool: &SqlitePool,
    workspace_id: Uuid,
    data: &CreateStatus,
) -> Result<Status, PipelineError> {
    let mut errors = ValidationErrors::new();
    validate_name(&mut errors, &data.name);
    validate_color(&mut errors, &data.color);
    errors.into_result()?;
    Ok(Status::create(pool, workspace_id, data).await?)
}

pub async fn update_status(
    pool: &SqlitePool,
    status: &Status,
    data: &UpdateStatus,
) -> Result<Status, PipelineError> {
    let mut errors = ValidationErrors::new();
    if let Some(name) = &data.name {
        validate_name(&mut errors, name);
    }
    if let Some(color) = &data.color {
        validate_color(&mut errors, color);
    }
    errors.into_result()?;
    Ok(Status::update(pool, status.id, data).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorder_accepts_permutation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert!(validate_reorder(&[a, b, c], &[c, a, b]).is_ok());
    }

    #[test]
    fn test_reorder_rejects_missing_duplicate_and_foreign() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        assert!(validate_reorder(&[a, b], &[a]).unwrap_err().has("status_ids"));
        assert!(validate_reorder(&[a, b], &[a, a, b]).unwrap_err().has("status_ids"));
        assert!(validate_reorder(&[a, b], &[a, b, stranger]).unwrap_err().has("status_ids"));
    }

    #[test]
    fn test_color_validation() {
        let mut errors = ValidationErrors::new();
        validate_color(&mut errors, "#3b82f6");
        validate_color(&mut errors, "#fff");
        assert!(errors.is_empty());
        validate_color(&mut errors, "blue");
        assert!(errors.has("color"));
    }
}
