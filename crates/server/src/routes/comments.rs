use axum::{
    Extension, Router,
    extract::{OriginalUri, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{delete, get},
};
use db::{
    models::comment::{Comment, CreateComment, EntityRef, EntityType},
    validation::ValidationErrors,
};
use serde::Deserialize;
use services::services::webhooks::{self, WebhookEvent};
use utils::{
    pagination::{PageParams, Paginated},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    extract::Json,
    middleware::{Membership, RequestContext, authorize, load_comment_middleware},
};

const MAX_BODY_CHARS: usize = 65_535;

#[derive(Debug, Deserialize)]
pub struct EntityQuery {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
}

/// Workspace of the commented record, 404 when the record is gone.
async fn resolve(state: &AppState, entity: EntityRef) -> Result<Uuid, ApiError> {
    entity
        .resolve_workspace(state.pool())
        .await?
        .ok_or_else(|| ApiError::not_found(&entity.entity_type().to_string()))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<EntityQuery>,
    Query(params): Query<PageParams>,
) -> Result<ResponseJson<Paginated<Comment>>, ApiError> {
    let entity = EntityRef::new(query.entity_type, query.entity_id);
    let workspace_id = resolve(&state, entity).await?;
    authorize(state.pool(), workspace_id, &ctx).await?;

    let page = state.page(&params);
    let (comments, total) = Comment::list_for_entity(state.pool(), entity, page).await?;
    Ok(ResponseJson(Paginated::new(comments, total, page, uri.path())))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<EntityQuery>,
    Json(payload): Json<CreateComment>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Comment>>), ApiError> {
    let entity = EntityRef::new(query.entity_type, query.entity_id);
    let workspace_id = resolve(&state, entity).await?;
    authorize(state.pool(), workspace_id, &ctx).await?;

    let mut errors = ValidationErrors::new();
    errors.required("body", &payload.body);
    errors.max_len("body", &payload.body, MAX_BODY_CHARS);
    errors.into_result()?;

    let comment =
        Comment::create(state.pool(), workspace_id, entity, ctx.user.id, payload.body.trim())
            .await?;
    webhooks::emit(state.pool(), workspace_id, WebhookEvent::CommentCreated, &comment).await;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(comment))))
}

/// Authors may delete their own comments; owners and admins any.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(comment): Extension<Comment>,
    Extension(membership): Extension<Membership>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if comment.author_id != Some(ctx.user.id) {
        membership.require_manage()?;
    }
    let rows_affected = Comment::delete(state.pool(), comment.id).await?;
    if rows_affected == 0 {
        Err(ApiError::not_found("Comment"))
    } else {
        Ok(ResponseJson(ApiResponse::success(())))
    }
}

pub fn router(state: &AppState) -> Router<AppState> {
    let comment_router = Router::new()
        .route("/comments/{comment_id}", delete(delete_comment))
        .route_layer(from_fn_with_state(state.clone(), load_comment_middleware));

    Router::new()
        .route("/comments", get(list_comments).post(create_comment))
        .merge(comment_router)
}
