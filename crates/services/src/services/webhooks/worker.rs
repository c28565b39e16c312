//! Background sender for pending webhook deliveries.

use std::{sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use db::models::webhook_delivery::{AttemptFailure, DueDelivery, WebhookDelivery};
use sqlx::SqlitePool;
use tokio::{
    task::{JoinHandle, JoinSet},
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::{
    WebhookError,
    retry::{AttemptOutcome, RetryPolicy, Transition},
    signature::{self, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER},
};
use crate::services::config::WebhookConfig;

/// Stored response bodies are cut to this many bytes.
pub const MAX_RESPONSE_BODY_BYTES: usize = 2048;

#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Sends one signed request. Errors are transport-level failures (DNS, TLS, timeout).
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, request: OutgoingRequest) -> Result<TransportResponse, String>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: StdDuration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("orbit-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, request: OutgoingRequest) -> Result<TransportResponse, String> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}

/// Cut `body` to at most `max` bytes on a char boundary.
pub fn truncate_body(body: &str, max: usize) -> &str {
    if body.len() <= max {
        return body;
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

pub struct DeliveryWorker<T: WebhookTransport> {
    pool: SqlitePool,
    transport: Arc<T>,
    policy: RetryPolicy,
    batch_size: i64,
    poll_interval: StdDuration,
    lease: Duration,
}

impl DeliveryWorker<ReqwestTransport> {
    pub fn from_config(pool: SqlitePool, config: &WebhookConfig) -> Result<Self, reqwest::Error> {
        let transport = ReqwestTransport::new(StdDuration::from_secs(config.timeout_secs))?;
        Ok(Self::new(pool, transport, config))
    }
}

impl<T: WebhookTransport + 'static> DeliveryWorker<T> {
    pub fn new(pool: SqlitePool, transport: T, config: &WebhookConfig) -> Self {
        Self {
            pool,
            transport: Arc::new(transport),
            policy: RetryPolicy::from(config),
            batch_size: i64::from(config.batch_size.max(1)),
            poll_interval: StdDuration::from_secs(config.poll_interval_secs.max(1)),
            // A claimed delivery is invisible to other polls until the attempt is over.
            lease: Duration::seconds(i64::try_from(config.timeout_secs).unwrap_or(60) * 2 + 30),
        }
    }

    /// Claim and attempt every delivery due at `now`. Returns how many were attempted.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize, WebhookError> {
        let due = WebhookDelivery::find_due(&self.pool, now, self.batch_size).await?;
        if due.is_empty() {
            return Ok(0);
        }

        let mut attempts = JoinSet::new();
        for delivery in due {
            if !WebhookDelivery::claim(&self.pool, delivery.delivery.id, now, now + self.lease)
                .await?
            {
                debug!(delivery_id = %delivery.delivery.id, "Delivery already claimed");
                continue;
            }
            let pool = self.pool.clone();
            let transport = self.transport.clone();
            let policy = self.policy.clone();
            attempts.spawn(async move { attempt(&pool, transport.as_ref(), &policy, delivery).await });
        }

        let mut attempted = 0;
        while let Some(result) = attempts.join_next().await {
            match result {
                Ok(Ok(_)) => attempted += 1,
                Ok(Err(e)) => error!(error = %e, "Failed to record webhook attempt"),
                Err(e) => error!(error = %e, "Webhook attempt task panicked"),
            }
        }
        Ok(attempted)
    }

    /// Poll for due deliveries until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                poll_interval_secs = self.poll_interval.as_secs(),
                max_attempts = self.policy.max_attempts,
                "Webhook delivery worker started"
            );
            let mut interval = time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                match self.run_once(Utc::now()).await {
                    Ok(0) => {}
                    Ok(attempted) => debug!(attempted, "Processed webhook deliveries"),
                    Err(e) => error!(error = %e, "Webhook delivery poll failed"),
                }
            }
        })
    }
}

/// Send one delivery and record the outcome.
async fn attempt<T: WebhookTransport + ?Sized>(
    pool: &SqlitePool,
    transport: &T,
    policy: &RetryPolicy,
    due: DueDelivery,
) -> Result<WebhookDelivery, WebhookError> {
    let delivery = due.delivery;
    let attempts = u32::try_from(delivery.attempts).unwrap_or(0).saturating_add(1);
    let body = serde_json::to_string(&delivery.payload)?;

    let result = match signature::sign(&due.secret, body.as_bytes()) {
        Ok(signature) => {
            let request = OutgoingRequest {
                url: due.url.clone(),
                headers: vec![
                    (SIGNATURE_HEADER, signature),
                    (EVENT_HEADER, delivery.event.clone()),
                    (DELIVERY_HEADER, delivery.id.to_string()),
                ],
                body,
            };
            transport.post(request).await
        }
        Err(e) => Err(format!("Failed to sign payload: {e}")),
    };

    let now = Utc::now();
    let failure = match result {
        Ok(response) if (200..300).contains(&response.status) => {
            info!(
                delivery_id = %delivery.id,
                status = response.status,
                attempts,
                "Webhook delivered"
            );
            let body = truncate_body(&response.body, MAX_RESPONSE_BODY_BYTES);
            return Ok(WebhookDelivery::record_success(
                pool,
                delivery.id,
                i64::from(attempts),
                i64::from(response.status),
                Some(body),
                now,
            )
            .await?);
        }
        Ok(response) => AttemptFailure {
            response_status: Some(i64::from(response.status)),
            response_body: Some(truncate_body(&response.body, MAX_RESPONSE_BODY_BYTES).to_string()),
            error: format!("Receiver responded with HTTP {}", response.status),
        },
        Err(e) => AttemptFailure {
            response_status: None,
            response_body: None,
            error: e,
        },
    };

    let retry_at = match policy.next_transition(attempts, AttemptOutcome::Failure, now) {
        Transition::Retry { at } => Some(at),
        _ => None,
    };
    warn!(
        delivery_id = %delivery.id,
        attempts,
        error = %failure.error,
        will_retry = retry_at.is_some(),
        "Webhook attempt failed"
    );
    Ok(WebhookDelivery::record_failure(pool, delivery.id, i64::from(attempts), &failure, retry_at).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        assert_eq!(truncate_body("short", 2048), "short");
        let long = "a".repeat(3000);
        assert_eq!(truncate_body(&long, 2048).len(), 2048);
        // 'é' is two bytes; cutting in the middle backs off one byte.
        let accented = "é".repeat(1500);
        let cut = truncate_body(&accented, 2047);
        assert_eq!(cut.len(), 2046);
    }
}
