use axum::{
    Extension, Router,
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    wiki::{CreateWiki, UpdateWiki, Wiki},
    wiki_revision::WikiRevision,
    workspace::Workspace,
};
use serde::Deserialize;
use services::services::wiki::{self, WikiDiff, WikiUpdate};
use tracing::instrument;
use utils::{
    pagination::{PageParams, Paginated},
    response::ApiResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    extract::Json,
    middleware::{RequestContext, load_wiki_middleware, load_workspace_middleware},
};

#[derive(Debug, Deserialize)]
pub struct WikiListQuery {
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub from: i64,
    pub to: i64,
}

pub async fn list_wikis(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Query(query): Query<WikiListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Wiki>>>, ApiError> {
    let wikis = Wiki::list_for_workspace(state.pool(), workspace.id, query.parent_id).await?;
    Ok(ResponseJson(ApiResponse::success(wikis)))
}

#[instrument(
    name = "wikis.create",
    skip(state, ctx, workspace, payload),
    fields(user_id = %ctx.user.id, workspace_id = %workspace.id)
)]
pub async fn create_wiki(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(workspace): Extension<Workspace>,
    Json(payload): Json<CreateWiki>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<WikiUpdate>>), ApiError> {
    let created = wiki::create_wiki(state.pool(), workspace.id, &payload, ctx.user.id).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(created))))
}

pub async fn get_wiki(
    Extension(wiki): Extension<Wiki>,
) -> Result<ResponseJson<ApiResponse<Wiki>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(wiki)))
}

/// Returns the page plus the revision the edit produced, if any.
pub async fn update_wiki(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(wiki): Extension<Wiki>,
    Json(payload): Json<UpdateWiki>,
) -> Result<ResponseJson<ApiResponse<WikiUpdate>>, ApiError> {
    let updated = wiki::update_wiki(state.pool(), &wiki, &payload, ctx.user.id).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn delete_wiki(
    State(state): State<AppState>,
    Extension(wiki): Extension<Wiki>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = Wiki::delete(state.pool(), wiki.id).await?;
    if rows_affected == 0 {
        Err(ApiError::not_found("Wiki"))
    } else {
        tracing::info!(wiki_id = %wiki.id, "Wiki deleted");
        Ok(ResponseJson(ApiResponse::success(())))
    }
}

pub async fn list_revisions(
    State(state): State<AppState>,
    Extension(wiki): Extension<Wiki>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> Result<ResponseJson<Paginated<WikiRevision>>, ApiError> {
    let page = state.page(&params);
    let (revisions, total) = WikiRevision::list_for_wiki(state.pool(), wiki.id, page).await?;
    Ok(ResponseJson(Paginated::new(revisions, total, page, uri.path())))
}

pub async fn get_revision(
    State(state): State<AppState>,
    Extension(wiki): Extension<Wiki>,
    Path((_, number)): Path<(Uuid, i64)>,
) -> Result<ResponseJson<ApiResponse<WikiRevision>>, ApiError> {
    let revision = WikiRevision::find_by_number(state.pool(), wiki.id, number)
        .await?
        .ok_or_else(|| ApiError::not_found("Revision"))?;
    Ok(ResponseJson(ApiResponse::success(revision)))
}

#[instrument(
    name = "wikis.restore",
    skip(state, ctx, wiki),
    fields(wiki_id = %wiki.id, revision = number)
)]
pub async fn restore_revision(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(wiki): Extension<Wiki>,
    Path((_, number)): Path<(Uuid, i64)>,
) -> Result<ResponseJson<ApiResponse<WikiUpdate>>, ApiError> {
    let restored = wiki::restore_revision(state.pool(), &wiki, number, ctx.user.id).await?;
    Ok(ResponseJson(ApiResponse::success(restored)))
}

pub async fn diff_revisions(
    State(state): State<AppState>,
    Extension(wiki): Extension<Wiki>,
    Query(query): Query<DiffQuery>,
) -> Result<ResponseJson<ApiResponse<WikiDiff>>, ApiError> {
    let diff = wiki::diff_revisions(state.pool(), &wiki, query.from, query.to).await?;
    Ok(ResponseJson(ApiResponse::success(diff)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let workspace_router = Router::new()
        .route(
            "/workspaces/{workspace_id}/wikis",
            get(list_wikis).post(create_wiki),
        )
        .route_layer(from_fn_with_state(state.clone(), load_workspace_middleware));

    let wiki_router = Router::new()
        .route(
            "/wikis/{wiki_id}",
            get(get_wiki).put(update_wiki).delete(delete_wiki),
        )
        .route("/wikis/{wiki_id}/revisions", get(list_revisions))
        .route("/wikis/{wiki_id}/revisions/{number}", get(get_revision))
        .route(
            "/wikis/{wiki_id}/revisions/{number}/restore",
            post(restore_revision),
        )
        .route("/wikis/{wiki_id}/diff", get(diff_revisions))
        .route_layer(from_fn_with_state(state.clone(), load_wiki_middleware));

    Router::new().merge(workspace_router).merge(wiki_router)
}
