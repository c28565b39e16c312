//! Load the resource named by the path, check the caller belongs to its
//! workspace, and insert both into the request extensions.

use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use db::models::{
    comment::Comment,
    milestone::Milestone,
    pipeline::{Pipeline, Status},
    project::Project,
    task::Task,
    webhook::Webhook,
    wiki::Wiki,
    workspace::{Workspace, WorkspaceRole},
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppState, error::ApiError, middleware::RequestContext};

/// The caller's role in the workspace that owns the loaded resource.
#[derive(Debug, Clone, Copy)]
pub struct Membership {
    pub workspace_id: Uuid,
    pub role: WorkspaceRole,
}

impl Membership {
    /// Owner or admin only.
    pub fn require_manage(&self) -> Result<(), ApiError> {
        if self.role.can_manage() {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }
}

/// Resolve the caller's membership in `workspace_id`, 403 when absent.
pub async fn authorize(
    pool: &SqlitePool,
    workspace_id: Uuid,
    ctx: &RequestContext,
) -> Result<Membership, ApiError> {
    match Workspace::role_of(pool, workspace_id, ctx.user.id).await? {
        Some(role) => Ok(Membership { workspace_id, role }),
        None => {
            tracing::warn!(
                user_id = %ctx.user.id,
                workspace_id = %workspace_id,
                "Rejected cross-workspace access"
            );
            Err(ApiError::forbidden())
        }
    }
}

fn path_id(params: &HashMap<String, String>, key: &str, resource: &str) -> Result<Uuid, ApiError> {
    params
        .get(key)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| ApiError::not_found(resource))
}

fn context(request: &Request) -> Result<RequestContext, ApiError> {
    request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .ok_or(ApiError::Unauthorized)
}

async fn finish<T: Clone + Send + Sync + 'static>(
    mut request: Request,
    next: Next,
    model: T,
    membership: Membership,
) -> Response {
    request.extensions_mut().insert(model);
    request.extensions_mut().insert(membership);
    next.run(request).await
}

pub async fn load_workspace_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = context(&request)?;
    let id = path_id(&params, "workspace_id", "Workspace")?;
    let workspace = Workspace::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Workspace"))?;
    let membership = authorize(state.pool(), workspace.id, &ctx).await?;
    Ok(finish(request, next, workspace, membership).await)
}

pub async fn load_pipeline_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = context(&request)?;
    let id = path_id(&params, "pipeline_id", "Pipeline")?;
    let pipeline = Pipeline::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Pipeline"))?;
    let membership = authorize(state.pool(), pipeline.workspace_id, &ctx).await?;
    Ok(finish(request, next, pipeline, membership).await)
}

pub async fn load_status_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = context(&request)?;
    let id = path_id(&params, "status_id", "Status")?;
    let status = Status::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Status"))?;
    let membership = authorize(state.pool(), status.workspace_id, &ctx).await?;
    Ok(finish(request, next, status, membership).await)
}

pub async fn load_project_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = context(&request)?;
    let id = path_id(&params, "project_id", "Project")?;
    let project = Project::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;
    let membership = authorize(state.pool(), project.workspace_id, &ctx).await?;
    Ok(finish(request, next, project, membership).await)
}

/// Inserts the milestone and its project.
pub async fn load_milestone_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = context(&request)?;
    let id = path_id(&params, "milestone_id", "Milestone")?;
    let milestone = Milestone::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Milestone"))?;
    let project = Project::find_by_id(state.pool(), milestone.project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Milestone"))?;
    let membership = authorize(state.pool(), project.workspace_id, &ctx).await?;
    request.extensions_mut().insert(project);
    Ok(finish(request, next, milestone, membership).await)
}

/// Inserts the task and its project.
pub async fn load_task_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = context(&request)?;
    let id = path_id(&params, "task_id", "Task")?;
    let task = Task::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;
    let project = Project::find_by_id(state.pool(), task.project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;
    let membership = authorize(state.pool(), project.workspace_id, &ctx).await?;
    request.extensions_mut().insert(project);
    Ok(finish(request, next, task, membership).await)
}

pub async fn load_wiki_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = context(&request)?;
    let id = path_id(&params, "wiki_id", "Wiki")?;
    let wiki = Wiki::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Wiki"))?;
    let membership = authorize(state.pool(), wiki.workspace_id, &ctx).await?;
    Ok(finish(request, next, wiki, membership).await)
}

/// Webhooks are visible to owners and admins only.
pub async fn load_webhook_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = context(&request)?;
    let id = path_id(&params, "webhook_id", "Webhook")?;
    let webhook = Webhook::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Webhook"))?;
    let membership = authorize(state.pool(), webhook.workspace_id, &ctx).await?;
    membership.require_manage()?;
    Ok(finish(request, next, webhook, membership).await)
}

pub async fn load_comment_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = context(&request)?;
    let id = path_id(&params, "comment_id", "Comment")?;
    let comment = Comment::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))?;
    let membership = authorize(state.pool(), comment.workspace_id, &ctx).await?;
    Ok(finish(request, next, comment, membership).await)
}
