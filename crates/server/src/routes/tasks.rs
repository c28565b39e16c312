use axum::{
    Extension, Router,
    extract::{OriginalUri, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    project::Project,
    task::{CreateTask, Task, TaskFilter, TaskRecurrence, UpdateTask, UpsertRecurrence},
};
use serde::Deserialize;
use services::services::{
    recurring_tasks::{self, RecurrencePreview},
    tasks::{self, CompletedTask},
};
use tracing::instrument;
use ts_rs::TS;
use utils::{
    pagination::{PageParams, Paginated},
    response::ApiResponse,
};

use crate::{
    AppState,
    error::ApiError,
    extract::Json,
    middleware::{RequestContext, load_project_middleware, load_task_middleware},
};

const DEFAULT_PREVIEW_COUNT: usize = 5;

#[derive(Debug, Deserialize, TS)]
pub struct PreviewQuery {
    pub count: Option<usize>,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    OriginalUri(uri): OriginalUri,
    Query(filter): Query<TaskFilter>,
    Query(params): Query<PageParams>,
) -> Result<ResponseJson<Paginated<Task>>, ApiError> {
    let page = state.page(&params);
    let (tasks, total) = Task::list_for_project(state.pool(), project.id, &filter, page).await?;
    Ok(ResponseJson(Paginated::new(tasks, total, page, uri.path())))
}

#[instrument(
    name = "tasks.create",
    skip(state, ctx, project, payload),
    fields(user_id = %ctx.user.id, project_id = %project.id)
)]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(project): Extension<Project>,
    Json(payload): Json<CreateTask>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Task>>), ApiError> {
    let task = tasks::create_task(state.pool(), &project, &payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(task))))
}

pub async fn get_task(
    Extension(task): Extension<Task>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(project): Extension<Project>,
    Json(payload): Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let updated = tasks::update_task(state.pool(), &project, &task, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = tasks::delete_task(state.pool(), &project, &task).await?;
    if rows_affected == 0 {
        Err(ApiError::not_found("Task"))
    } else {
        Ok(ResponseJson(ApiResponse::success(())))
    }
}

pub async fn list_subtasks(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let children = Task::find_children(state.pool(), task.id).await?;
    Ok(ResponseJson(ApiResponse::success(children)))
}

#[instrument(name = "tasks.complete", skip(state, task, project), fields(task_id = %task.id))]
pub async fn complete_task(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<CompletedTask>>, ApiError> {
    let outcome = tasks::complete_task(state.pool(), &project, &task).await?;
    Ok(ResponseJson(ApiResponse::success(outcome)))
}

pub async fn reopen_task(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let reopened = tasks::reopen_task(state.pool(), &project, &task).await?;
    Ok(ResponseJson(ApiResponse::success(reopened)))
}

pub async fn get_recurrence(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
) -> Result<ResponseJson<ApiResponse<TaskRecurrence>>, ApiError> {
    let recurrence = TaskRecurrence::find_by_task(state.pool(), task.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Recurrence"))?;
    Ok(ResponseJson(ApiResponse::success(recurrence)))
}

pub async fn upsert_recurrence(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Json(payload): Json<UpsertRecurrence>,
) -> Result<ResponseJson<ApiResponse<TaskRecurrence>>, ApiError> {
    let recurrence = recurring_tasks::upsert_recurrence(state.pool(), &task, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(recurrence)))
}

pub async fn delete_recurrence(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = TaskRecurrence::delete_for_task(state.pool(), task.id).await?;
    if rows_affected == 0 {
        Err(ApiError::not_found("Recurrence"))
    } else {
        Ok(ResponseJson(ApiResponse::success(())))
    }
}

pub async fn preview_recurrence(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Query(query): Query<PreviewQuery>,
) -> Result<ResponseJson<ApiResponse<RecurrencePreview>>, ApiError> {
    let count = query.count.unwrap_or(DEFAULT_PREVIEW_COUNT);
    let preview = recurring_tasks::preview(state.pool(), &task, count)
        .await?
        .ok_or_else(|| ApiError::not_found("Recurrence"))?;
    Ok(ResponseJson(ApiResponse::success(preview)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let project_router = Router::new()
        .route(
            "/projects/{project_id}/tasks",
            get(list_tasks).post(create_task),
        )
        .route_layer(from_fn_with_state(state.clone(), load_project_middleware));

    let task_router = Router::new()
        .route(
            "/tasks/{task_id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/{task_id}/subtasks", get(list_subtasks))
        .route("/tasks/{task_id}/complete", post(complete_task))
        .route("/tasks/{task_id}/reopen", post(reopen_task))
        .route(
            "/tasks/{task_id}/recurrence",
            get(get_recurrence)
                .put(upsert_recurrence)
                .delete(delete_recurrence),
        )
        .route("/tasks/{task_id}/recurrence/preview", get(preview_recurrence))
        .route_layer(from_fn_with_state(state.clone(), load_task_middleware));

    Router::new().merge(project_router).merge(task_router)
}
