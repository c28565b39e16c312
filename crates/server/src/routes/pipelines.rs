use axum::{
    Extension, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use db::models::{
    pipeline::{AttachStatus, CreatePipeline, OrderedStatus, Pipeline, ReorderStatuses, UpdatePipeline},
    workspace::Workspace,
};
use services::services::pipelines::{self, PipelineWithStatuses};
use tracing::instrument;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    extract::Json,
    middleware::{Membership, load_pipeline_middleware, load_workspace_middleware},
};

pub async fn list_pipelines(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
) -> Result<ResponseJson<ApiResponse<Vec<Pipeline>>>, ApiError> {
    let pipelines = Pipeline::find_by_workspace(state.pool(), workspace.id).await?;
    Ok(ResponseJson(ApiResponse::success(pipelines)))
}

#[instrument(name = "pipelines.create", skip(state, workspace, membership, payload), fields(workspace_id = %workspace.id))]
pub async fn create_pipeline(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Extension(membership): Extension<Membership>,
    Json(payload): Json<CreatePipeline>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<PipelineWithStatuses>>), ApiError> {
    membership.require_manage()?;
    let pipeline = pipelines::create_pipeline(state.pool(), workspace.id, &payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(pipeline))))
}

pub async fn get_pipeline(
    State(state): State<AppState>,
    Extension(pipeline): Extension<Pipeline>,
) -> Result<ResponseJson<ApiResponse<PipelineWithStatuses>>, ApiError> {
    let pipeline = pipelines::with_statuses(state.pool(), pipeline).await?;
    Ok(ResponseJson(ApiResponse::success(pipeline)))
}

pub async fn update_pipeline(
    State(state): State<AppState>,
    Extension(pipeline): Extension<Pipeline>,
    Extension(membership): Extension<Membership>,
    Json(payload): Json<UpdatePipeline>,
) -> Result<ResponseJson<ApiResponse<Pipeline>>, ApiError> {
    membership.require_manage()?;
    let updated = pipelines::update_pipeline(state.pool(), &pipeline, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn delete_pipeline(
    State(state): State<AppState>,
    Extension(pipeline): Extension<Pipeline>,
    Extension(membership): Extension<Membership>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    membership.require_manage()?;
    let rows_affected = Pipeline::delete(state.pool(), pipeline.id).await?;
    if rows_affected == 0 {
        Err(ApiError::Database(sqlx::Error::RowNotFound))
    } else {
        Ok(ResponseJson(ApiResponse::success(())))
    }
}

pub async fn list_statuses(
    State(state): State<AppState>,
    Extension(pipeline): Extension<Pipeline>,
) -> Result<ResponseJson<ApiResponse<Vec<OrderedStatus>>>, ApiError> {
    let mut conn = state.pool().acquire().await?;
    let statuses = Pipeline::statuses(&mut conn, pipeline.id).await?;
    Ok(ResponseJson(ApiResponse::success(statuses)))
}

pub async fn attach_status(
    State(state): State<AppState>,
    Extension(pipeline): Extension<Pipeline>,
    Extension(membership): Extension<Membership>,
    Json(payload): Json<AttachStatus>,
) -> Result<ResponseJson<ApiResponse<Vec<OrderedStatus>>>, ApiError> {
    membership.require_manage()?;
    let statuses = pipelines::attach_status(state.pool(), &pipeline, payload.status_id).await?;
    Ok(ResponseJson(ApiResponse::success(statuses)))
}

pub async fn detach_status(
    State(state): State<AppState>,
    Extension(pipeline): Extension<Pipeline>,
    Extension(membership): Extension<Membership>,
    Path((_, status_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<Vec<OrderedStatus>>>, ApiError> {
    membership.require_manage()?;
    let statuses = pipelines::detach_status(state.pool(), &pipeline, status_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Status"))?;
    Ok(ResponseJson(ApiResponse::success(statuses)))
}

#[instrument(name = "pipelines.reorder", skip(state, pipeline, membership, payload), fields(pipeline_id = %pipeline.id))]
pub async fn reorder_statuses(
    State(state): State<AppState>,
    Extension(pipeline): Extension<Pipeline>,
    Extension(membership): Extension<Membership>,
    Json(payload): Json<ReorderStatuses>,
) -> Result<ResponseJson<ApiResponse<Vec<OrderedStatus>>>, ApiError> {
    membership.require_manage()?;
    let statuses = pipelines::reorder(state.pool(), &pipeline, &payload.status_ids).await?;
    Ok(ResponseJson(ApiResponse::success(statuses)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let workspace_router = Router::new()
        .route(
            "/workspaces/{workspace_id}/pipelines",
            get(list_pipelines).post(create_pipeline),
        )
        .route_layer(from_fn_with_state(state.clone(), load_workspace_middleware));

    let pipeline_router = Router::new()
        .route(
            "/pipelines/{pipeline_id}",
            get(get_pipeline).put(update_pipeline).delete(delete_pipeline),
        )
        .route(
            "/pipelines/{pipeline_id}/statuses",
            get(list_statuses).post(attach_status),
        )
        .route(
            "/pipelines/{pipeline_id}/statuses/{status_id}",
            delete(detach_status),
        )
        .route("/pipelines/{pipeline_id}/reorder", post(reorder_statuses))
        .route_layer(from_fn_with_state(state.clone(), load_pipeline_middleware));

    Router::new().merge(workspace_router).merge(pipeline_router)
}
