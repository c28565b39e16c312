use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::{
    models::{
        milestone::{CreateMilestone, Milestone, UpdateMilestone},
        project::Project,
    },
    validation::ValidationErrors,
};
use services::services::webhooks::{self, WebhookEvent};
use utils::{nullable, response::ApiResponse};

use crate::{
    AppState,
    error::ApiError,
    extract::Json,
    middleware::{load_milestone_middleware, load_project_middleware},
};

fn validate_text(name: Option<&str>, description: Option<&str>) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Some(name) = name {
        errors.required("name", name);
        errors.max_len("name", name, 255);
    }
    if let Some(description) = description {
        errors.max_len("description", description, 65_535);
    }
    errors.into_result()
}

pub async fn list_milestones(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<Vec<Milestone>>>, ApiError> {
    let milestones = Milestone::find_by_project(state.pool(), project.id).await?;
    Ok(ResponseJson(ApiResponse::success(milestones)))
}

pub async fn create_milestone(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Json(payload): Json<CreateMilestone>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Milestone>>), ApiError> {
    validate_text(Some(&payload.name), payload.description.as_deref())?;
    let milestone = Milestone::create(state.pool(), project.id, &payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(milestone))))
}

pub async fn update_milestone(
    State(state): State<AppState>,
    Extension(milestone): Extension<Milestone>,
    Json(payload): Json<UpdateMilestone>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    validate_text(
        payload.name.as_deref(),
        nullable::value(&payload.description).map(String::as_str),
    )?;
    let updated = Milestone::update(state.pool(), milestone.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn complete_milestone(
    State(state): State<AppState>,
    Extension(milestone): Extension<Milestone>,
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let completed = Milestone::set_completed(state.pool(), milestone.id, true).await?;
    if milestone.completed_at.is_none() {
        webhooks::emit(
            state.pool(),
            project.workspace_id,
            WebhookEvent::MilestoneCompleted,
            &completed,
        )
        .await;
    }
    Ok(ResponseJson(ApiResponse::success(completed)))
}

pub async fn reopen_milestone(
    State(state): State<AppState>,
    Extension(milestone): Extension<Milestone>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let reopened = Milestone::set_completed(state.pool(), milestone.id, false).await?;
    Ok(ResponseJson(ApiResponse::success(reopened)))
}

pub async fn delete_milestone(
    State(state): State<AppState>,
    Extension(milestone): Extension<Milestone>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = Milestone::delete(state.pool(), milestone.id).await?;
    if rows_affected == 0 {
        Err(ApiError::Database(sqlx::Error::RowNotFound))
    } else {
        Ok(ResponseJson(ApiResponse::success(())))
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    let project_router = Router::new()
        .route(
            "/projects/{project_id}/milestones",
            get(list_milestones).post(create_milestone),
        )
        .route_layer(from_fn_with_state(state.clone(), load_project_middleware));

    let milestone_router = Router::new()
        .route(
            "/milestones/{milestone_id}",
            put(update_milestone).delete(delete_milestone),
        )
        .route("/milestones/{milestone_id}/complete", post(complete_milestone))
        .route("/milestones/{milestone_id}/reopen", post(reopen_milestone))
        .route_layer(from_fn_with_state(state.clone(), load_milestone_middleware));

    Router::new().merge(project_router).merge(milestone_router)
}
