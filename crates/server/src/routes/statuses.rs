use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::{
    pipeline::{CreateStatus, Status, UpdateStatus},
    workspace::Workspace,
};
use services::services::pipelines;
use utils::response::ApiResponse;

use crate::{
    AppState,
    error::ApiError,
    extract::Json,
    middleware::{Membership, load_status_middleware, load_workspace_middleware},
};

pub async fn list_statuses(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
) -> Result<ResponseJson<ApiResponse<Vec<Status>>>, ApiError> {
    let statuses = Status::find_by_workspace(state.pool(), workspace.id).await?;
    Ok(ResponseJson(ApiResponse::success(statuses)))
}

pub async fn create_status(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Extension(membership): Extension<Membership>,
    Json(payload): Json<CreateStatus>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Status>>), ApiError> {
    membership.require_manage()?;
    let status = pipelines::create_status(state.pool(), workspace.id, &payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(status))))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(status): Extension<Status>,
    Extension(membership): Extension<Membership>,
    Json(payload): Json<UpdateStatus>,
) -> Result<ResponseJson<ApiResponse<Status>>, ApiError> {
    membership.require_manage()?;
    let updated = pipelines::update_status(state.pool(), &status, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

/// Removing a status also takes it out of every pipeline.
pub async fn delete_status(
    State(state): State<AppState>,
    Extension(status): Extension<Status>,
    Extension(membership): Extension<Membership>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    membership.require_manage()?;
    let rows_affected = Status::delete(state.pool(), status.id).await?;
    if rows_affected == 0 {
        Err(ApiError::Database(sqlx::Error::RowNotFound))
    } else {
        Ok(ResponseJson(ApiResponse::success(())))
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    let workspace_router = Router::new()
        .route(
            "/workspaces/{workspace_id}/statuses",
            get(list_statuses).post(create_status),
        )
        .route_layer(from_fn_with_state(state.clone(), load_workspace_middleware));

    let status_router = Router::new()
        .route("/statuses/{status_id}", put(update_status).delete(delete_status))
        .route_layer(from_fn_with_state(state.clone(), load_status_middleware));

    Router::new().merge(workspace_router).merge(status_router)
}
