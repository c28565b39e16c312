//! Outgoing webhooks: subscriptions, event dispatch and delivery bookkeeping.
//!
//! Dispatch only records `pending` deliveries; [`worker::DeliveryWorker`] sends
//! them and applies the [`retry::RetryPolicy`].

use chrono::Utc;
use db::{
    models::{
        webhook::{CreateWebhook, CreatedWebhook, UpdateWebhook, Webhook},
        webhook_delivery::{DeliveryStatus, WebhookDelivery},
    },
    validation::ValidationErrors,
};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};
use utils::nullable;
use uuid::Uuid;

pub mod events;
pub mod retry;
pub mod signature;
pub mod worker;

pub use events::WebhookEvent;
pub use retry::{AttemptOutcome, RetryPolicy, Transition};
pub use worker::{DeliveryWorker, ReqwestTransport, WebhookTransport};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Only failed deliveries can be retried (delivery is {0})")]
    NotRetryable(DeliveryStatus),
}

/// The JSON document POSTed to receivers.
fn envelope(
    event: WebhookEvent,
    workspace_id: Uuid,
    data: serde_json::Value,
) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "event": event.as_str(),
        "workspace_id": workspace_id,
        "occurred_at": Utc::now(),
        "data": data,
    })
}

/// Queue one pending delivery per active webhook subscribed to `event`.
pub async fn dispatch<T: Serialize>(
    pool: &SqlitePool,
    workspace_id: Uuid,
    event: WebhookEvent,
    data: &T,
) -> Result<Vec<WebhookDelivery>, WebhookError> {
    let webhooks = Webhook::find_subscribed(pool, workspace_id, event.as_str()).await?;
    if webhooks.is_empty() {
        return Ok(Vec::new());
    }

    let payload = envelope(event, workspace_id, serde_json::to_value(data)?);
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let mut deliveries = Vec::with_capacity(webhooks.len());
    for webhook in &webhooks {
        deliveries
            .push(WebhookDelivery::enqueue(&mut *tx, webhook.id, event.as_str(), &payload, now).await?);
    }
    tx.commit().await?;

    debug!(
        workspace_id = %workspace_id,
        event = event.as_str(),
        deliveries = deliveries.len(),
        "Queued webhook deliveries"
    );
    Ok(deliveries)
}

/// Fire-and-forget wrapper around [`dispatch`]: failures are logged, never returned.
pub async fn emit<T: Serialize>(
    pool: &SqlitePool,
    workspace_id: Uuid,
    event: WebhookEvent,
    data: &T,
) {
    if let Err(e) = dispatch(pool, workspace_id, event, data).await {
        warn!(
            workspace_id = %workspace_id,
            event = event.as_str(),
            error = %e,
            "Failed to queue webhook deliveries"
        );
    }
}

fn validate_create(data: &CreateWebhook) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.required("url", &data.url);
    errors.url("url", &data.url);
    errors.max_len("url", &data.url, 2048);
    events::validate_subscriptions("events", &data.events, &mut errors);
    if let Some(description) = &data.description {
        errors.max_len("description", description, 1000);
    }
    if let Some(secret) = &data.secret {
        if secret.chars().count() < 16 {
            errors.add("secret", "The secret field must be at least 16 characters.");
        }
        errors.max_len("secret", secret, 255);
    }
    errors.into_result()
}

fn validate_update(data: &UpdateWebhook) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Some(url) = &data.url {
        errors.url("url", url);
        errors.max_len("url", url, 2048);
    }
    if let Some(events) = &data.events {
        events::validate_subscriptions("events", events, &mut errors);
    }
    if let Some(description) = nullable::value(&data.description) {
        errors.max_len("description", description, 1000);
    }
    errors.into_result()
}

/// Register a webhook. The signing secret is generated unless one is supplied.
pub async fn create_webhook(
    pool: &SqlitePool,
    workspace_id: Uuid,
    data: &CreateWebhook,
) -> Result<CreatedWebhook, WebhookError> {
    validate_create(data)?;
    let secret = match &data.secret {
        Some(secret) => secret.clone(),
        None => signature::generate_secret(),
    };
    let webhook = Webhook::create(pool, workspace_id, data, &secret).await?;
    info!(webhook_id = %webhook.id, workspace_id = %workspace_id, "Webhook created");
    Ok(CreatedWebhook { webhook, secret })
}

pub async fn update_webhook(
    pool: &SqlitePool,
    webhook: &Webhook,
    data: &UpdateWebhook,
) -> Result<Webhook, WebhookError> {
    validate_update(data)?;
    Ok(Webhook::update(pool, webhook.id, data).await?)
}

/// Queue a `webhook.test` delivery for this webhook, whatever it subscribes to.
pub async fn send_test(pool: &SqlitePool, webhook: &Webhook) -> Result<WebhookDelivery, WebhookError> {
    let event = WebhookEvent::WebhookTest;
    let payload = envelope(
        event,
        webhook.workspace_id,
        json!({ "webhook_id": webhook.id, "message": "This is a test delivery." }),
    );
    Ok(WebhookDelivery::enqueue(pool, webhook.id, event.as_str(), &payload, Utc::now()).await?)
}

/// Manually requeue a failed delivery.
pub async fn retry_delivery(
    pool: &SqlitePool,
    delivery: &WebhookDelivery,
) -> Result<WebhookDelivery, WebhookError> {
    match WebhookDelivery::reset_for_retry(pool, delivery.id, Utc::now()).await? {
        Some(reset) => {
            info!(delivery_id = %delivery.id, "Webhook delivery requeued");
            Ok(reset)
        }
        None => Err(WebhookError::NotRetryable(delivery.status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(url: &str, events: &[&str]) -> CreateWebhook {
        CreateWebhook {
            url: url.to_string(),
            events: events.iter().map(|e| e.to_string()).collect(),
            description: None,
            secret: None,
            is_active: true,
        }
    }

    #[test]
    fn test_validate_create() {
        assert!(validate_create(&create("https://example.test/hook", &["*"])).is_ok());

        let errors = validate_create(&create("ftp://example.test", &[])).unwrap_err();
        assert!(errors.has("url"));
        assert!(errors.has("events"));

        let mut short_secret = create("https://example.test/hook", &["task.created"]);
        short_secret.secret = Some("short".to_string());
        assert!(validate_create(&short_secret).unwrap_err().has("secret"));
    }

    #[test]
    fn test_envelope_shape() {
        let workspace_id = Uuid::new_v4();
        let payload = envelope(WebhookEvent::TaskCreated, workspace_id, json!({"title": "x"}));
        assert_eq!(payload["event"], "task.created");
        assert_eq!(payload["workspace_id"], workspace_id.to_string());
        assert_eq!(payload["data"]["title"], "x");
        assert!(payload["id"].is_string());
    }
}
