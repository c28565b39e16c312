use axum::{
    Extension, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{delete, get},
};
use db::{
    models::{
        user::User,
        workspace::{AddWorkspaceMember, CreateWorkspace, UpdateWorkspace, Workspace, WorkspaceMember, WorkspaceRole},
    },
    validation::ValidationErrors,
};
use tracing::{info, instrument};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    extract::Json,
    middleware::{Membership, RequestContext, load_workspace_middleware},
};

fn validate_name(errors: &mut ValidationErrors, name: &str) {
    errors.required("name", name);
    errors.max_len("name", name, 255);
}

#[instrument(name = "workspaces.list", skip(state, ctx), fields(user_id = %ctx.user.id))]
pub async fn list_workspaces(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<ResponseJson<ApiResponse<Vec<Workspace>>>, ApiError> {
    let workspaces = Workspace::find_for_user(state.pool(), ctx.user.id).await?;
    Ok(ResponseJson(ApiResponse::success(workspaces)))
}

#[instrument(name = "workspaces.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<CreateWorkspace>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Workspace>>), ApiError> {
    let mut errors = ValidationErrors::new();
    validate_name(&mut errors, &payload.name);
    if let Some(slug) = &payload.slug {
        errors.max_len("slug", slug, 100);
        if Workspace::find_by_slug(state.pool(), slug).await?.is_some() {
            errors.add("slug", "The slug has already been taken.");
        }
    }
    errors.into_result()?;

    let workspace = Workspace::create(state.pool(), &payload, ctx.user.id).await?;
    info!(workspace_id = %workspace.id, "Workspace created");
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(workspace))))
}

pub async fn get_workspace(
    Extension(workspace): Extension<Workspace>,
) -> Result<ResponseJson<ApiResponse<Workspace>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(workspace)))
}

pub async fn update_workspace(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Extension(membership): Extension<Membership>,
    Json(payload): Json<UpdateWorkspace>,
) -> Result<ResponseJson<ApiResponse<Workspace>>, ApiError> {
    membership.require_manage()?;
    if let Some(name) = &payload.name {
        let mut errors = ValidationErrors::new();
        validate_name(&mut errors, name);
        errors.into_result()?;
    }
    let updated = Workspace::update(state.pool(), workspace.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
) -> Result<ResponseJson<ApiResponse<Vec<WorkspaceMember>>>, ApiError> {
    let members = Workspace::members(state.pool(), workspace.id).await?;
    Ok(ResponseJson(ApiResponse::success(members)))
}

#[instrument(name = "workspaces.add_member", skip(state, workspace, membership, payload), fields(workspace_id = %workspace.id))]
pub async fn add_member(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Extension(membership): Extension<Membership>,
    Json(payload): Json<AddWorkspaceMember>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Vec<WorkspaceMember>>>), ApiError> {
    membership.require_manage()?;

    let mut errors = ValidationErrors::new();
    errors.required("email", &payload.email);
    if payload.role == WorkspaceRole::Owner {
        errors.add("role", "A workspace has exactly one owner.");
    }
    errors.into_result()?;

    let user = User::find_by_email(state.pool(), payload.email.trim())
        .await?
        .ok_or_else(|| ValidationErrors::single("email", "The selected email is invalid."))?;
    if user.id == workspace.owner_id {
        return Err(ApiError::Conflict(
            "The owner's role cannot be changed.".to_string(),
        ));
    }

    Workspace::add_member(state.pool(), workspace.id, user.id, payload.role).await?;
    info!(user_id = %user.id, role = %payload.role, "Workspace member added");
    let members = Workspace::members(state.pool(), workspace.id).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(members))))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Extension(membership): Extension<Membership>,
    Path((_, user_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    membership.require_manage()?;
    if user_id == workspace.owner_id {
        return Err(ApiError::Conflict(
            "The workspace owner cannot be removed.".to_string(),
        ));
    }
    let rows_affected = Workspace::remove_member(state.pool(), workspace.id, user_id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("Member"));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let workspace_router = Router::new()
        .route(
            "/workspaces/{workspace_id}",
            get(get_workspace).put(update_workspace),
        )
        .route(
            "/workspaces/{workspace_id}/members",
            get(list_members).post(add_member),
        )
        .route(
            "/workspaces/{workspace_id}/members/{user_id}",
            delete(remove_member),
        )
        .route_layer(from_fn_with_state(state.clone(), load_workspace_middleware));

    Router::new()
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .merge(workspace_router)
}
