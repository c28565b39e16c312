use axum::{
    Extension, Router,
    extract::{OriginalUri, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::{
    models::{
        pipeline::Pipeline,
        project::{CreateProject, Project, ProjectFilter, UpdateProject},
        workspace::Workspace,
    },
    validation::ValidationErrors,
};
use services::services::webhooks::{self, WebhookEvent};
use sqlx::SqlitePool;
use tracing::{info, instrument};
use utils::{
    nullable,
    pagination::{PageParams, Paginated},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    extract::Json,
    middleware::{load_project_middleware, load_workspace_middleware},
};

async fn validate_project(
    pool: &SqlitePool,
    workspace_id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
    pipeline_id: Option<Uuid>,
) -> Result<(), ApiError> {
    let mut errors = ValidationErrors::new();
    if let Some(name) = name {
        errors.required("name", name);
        errors.max_len("name", name, 255);
    }
    if let Some(description) = description {
        errors.max_len("description", description, 65_535);
    }
    if let Some(pipeline_id) = pipeline_id {
        let in_workspace = Pipeline::find_by_id(pool, pipeline_id)
            .await?
            .is_some_and(|p| p.workspace_id == workspace_id);
        if !in_workspace {
            errors.add("pipeline_id", "The selected pipeline id is invalid.");
        }
    }
    Ok(errors.into_result()?)
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    OriginalUri(uri): OriginalUri,
    Query(filter): Query<ProjectFilter>,
    Query(params): Query<PageParams>,
) -> Result<ResponseJson<Paginated<Project>>, ApiError> {
    let page = state.page(&params);
    let (projects, total) =
        Project::list_for_workspace(state.pool(), workspace.id, &filter, page).await?;
    Ok(ResponseJson(Paginated::new(projects, total, page, uri.path())))
}

#[instrument(name = "projects.create", skip(state, workspace, payload), fields(workspace_id = %workspace.id))]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Json(payload): Json<CreateProject>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Project>>), ApiError> {
    validate_project(
        state.pool(),
        workspace.id,
        Some(&payload.name),
        payload.description.as_deref(),
        payload.pipeline_id,
    )
    .await?;

    let project = Project::create(state.pool(), workspace.id, &payload).await?;
    info!(project_id = %project.id, "Project created");
    webhooks::emit(state.pool(), workspace.id, WebhookEvent::ProjectCreated, &project).await;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(project))))
}

pub async fn get_project(
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(project)))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Json(payload): Json<UpdateProject>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    validate_project(
        state.pool(),
        project.workspace_id,
        payload.name.as_deref(),
        nullable::value(&payload.description).map(String::as_str),
        nullable::value(&payload.pipeline_id).copied(),
    )
    .await?;

    let updated = Project::update(state.pool(), project.id, &payload).await?;
    webhooks::emit(state.pool(), updated.workspace_id, WebhookEvent::ProjectUpdated, &updated).await;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn archive_project(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    let archived = Project::set_archived(state.pool(), project.id, true).await?;
    if !project.is_archived() {
        webhooks::emit(state.pool(), archived.workspace_id, WebhookEvent::ProjectArchived, &archived)
            .await;
    }
    Ok(ResponseJson(ApiResponse::success(archived)))
}

pub async fn activate_project(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    let activated = Project::set_archived(state.pool(), project.id, false).await?;
    if project.is_archived() {
        webhooks::emit(state.pool(), activated.workspace_id, WebhookEvent::ProjectUpdated, &activated)
            .await;
    }
    Ok(ResponseJson(ApiResponse::success(activated)))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = Project::soft_delete(state.pool(), project.id).await?;
    if rows_affected == 0 {
        Err(ApiError::Database(sqlx::Error::RowNotFound))
    } else {
        info!(project_id = %project.id, "Project deleted");
        Ok(ResponseJson(ApiResponse::success(())))
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    let workspace_router = Router::new()
        .route(
            "/workspaces/{workspace_id}/projects",
            get(list_projects).post(create_project),
        )
        .route_layer(from_fn_with_state(state.clone(), load_workspace_middleware));

    let project_router = Router::new()
        .route(
            "/projects/{project_id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/{project_id}/archive", post(archive_project))
        .route("/projects/{project_id}/activate", post(activate_project))
        .route_layer(from_fn_with_state(state.clone(), load_project_middleware));

    Router::new().merge(workspace_router).merge(project_router)
}
