use axum::{
    Extension, Router,
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    webhook::{CreateWebhook, CreatedWebhook, UpdateWebhook, Webhook},
    webhook_delivery::WebhookDelivery,
    workspace::Workspace,
};
use services::services::webhooks;
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
    middleware::{Membership, load_webhook_middleware, load_workspace_middleware},
};

pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Extension(membership): Extension<Membership>,
) -> Result<ResponseJson<ApiResponse<Vec<Webhook>>>, ApiError> {
    membership.require_manage()?;
    let hooks = Webhook::find_by_workspace(state.pool(), workspace.id).await?;
    Ok(ResponseJson(ApiResponse::success(hooks)))
}

/// The only response that carries the signing secret.
#[instrument(
    name = "webhooks.create",
    skip(state, workspace, membership, payload),
    fields(workspace_id = %workspace.id)
)]
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Extension(membership): Extension<Membership>,
    Json(payload): Json<CreateWebhook>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<CreatedWebhook>>), ApiError> {
    membership.require_manage()?;
    let created = webhooks::create_webhook(state.pool(), workspace.id, &payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(created))))
}

pub async fn get_webhook(
    Extension(webhook): Extension<Webhook>,
) -> Result<ResponseJson<ApiResponse<Webhook>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(webhook)))
}

pub async fn update_webhook(
    State(state): State<AppState>,
    Extension(webhook): Extension<Webhook>,
    Json(payload): Json<UpdateWebhook>,
) -> Result<ResponseJson<ApiResponse<Webhook>>, ApiError> {
    let updated = webhooks::update_webhook(state.pool(), &webhook, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(webhook): Extension<Webhook>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let rows_affected = Webhook::delete(state.pool(), webhook.id).await?;
    if rows_affected == 0 {
        Err(ApiError::not_found("Webhook"))
    } else {
        tracing::info!(webhook_id = %webhook.id, "Webhook deleted");
        Ok(ResponseJson(ApiResponse::success(())))
    }
}

pub async fn list_deliveries(
    State(state): State<AppState>,
    Extension(webhook): Extension<Webhook>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<PageParams>,
) -> Result<ResponseJson<Paginated<WebhookDelivery>>, ApiError> {
    let page = state.page(&params);
    let (deliveries, total) =
        WebhookDelivery::list_for_webhook(state.pool(), webhook.id, page).await?;
    Ok(ResponseJson(Paginated::new(deliveries, total, page, uri.path())))
}

pub async fn send_test(
    State(state): State<AppState>,
    Extension(webhook): Extension<Webhook>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<WebhookDelivery>>), ApiError> {
    let delivery = webhooks::send_test(state.pool(), &webhook).await?;
    Ok((StatusCode::ACCEPTED, ResponseJson(ApiResponse::success(delivery))))
}

#[instrument(name = "webhooks.retry", skip(state, webhook), fields(webhook_id = %webhook.id))]
pub async fn retry_delivery(
    State(state): State<AppState>,
    Extension(webhook): Extension<Webhook>,
    Path((_, delivery_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<WebhookDelivery>>, ApiError> {
    let delivery = WebhookDelivery::find_by_id(state.pool(), delivery_id)
        .await?
        .filter(|d| d.webhook_id == webhook.id)
        .ok_or_else(|| ApiError::not_found("Delivery"))?;
    let requeued = webhooks::retry_delivery(state.pool(), &delivery).await?;
    Ok(ResponseJson(ApiResponse::success(requeued)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let workspace_router = Router::new()
        .route(
            "/workspaces/{workspace_id}/webhooks",
            get(list_webhooks).post(create_webhook),
        )
        .route_layer(from_fn_with_state(state.clone(), load_workspace_middleware));

    let webhook_router = Router::new()
        .route(
            "/webhooks/{webhook_id}",
            get(get_webhook).put(update_webhook).delete(delete_webhook),
        )
        .route("/webhooks/{webhook_id}/deliveries", get(list_deliveries))
        .route("/webhooks/{webhook_id}/test", post(send_test))
        .route(
            "/webhooks/{webhook_id}/deliveries/{delivery_id}/retry",
            post(retry_delivery),
        )
        .route_layer(from_fn_with_state(state.clone(), load_webhook_middleware));

    Router::new().merge(workspace_router).merge(webhook_router)
}
