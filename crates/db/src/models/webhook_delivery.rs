//! Delivery bookkeeping for outgoing webhooks.
//!
//! A delivery starts `pending` with `next_attempt_at` set. Each attempt either
//! marks it `delivered`, reschedules it (still `pending`), or gives up (`failed`).
//! Terminal rows always have `next_attempt_at = NULL`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type, types::Json};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use utils::pagination::Page;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event: String,
    #[sqlx(json)]
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub attempts: i64,
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A claimed delivery together with where and how to send it.
#[derive(Debug, Clone, FromRow)]
pub struct DueDelivery {
    #[sqlx(flatten)]
    pub delivery: WebhookDelivery,
    pub url: String,
    pub secret: String,
}

/// What the last attempt produced, for [`WebhookDelivery::record_failure`].
#[derive(Debug, Clone, Default)]
pub struct AttemptFailure {
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub error: String,
}

const DELIVERY_COLUMNS: &str = "id, webhook_id, event, payload, status, attempts, \
     response_status, response_body, error, next_attempt_at, delivered_at, created_at, updated_at";

const DUE_DELIVERY_COLUMNS: &str = "d.id, d.webhook_id, d.event, d.payload, d.status, d.attempts, \
     d.response_status, d.response_body, d.error, d.next_attempt_at, d.delivered_at, \
     d.created_at, d.updated_at, w.url, w.secret";

impl WebhookDelivery {
    /// Queue a delivery, due immediately.
    pub async fn enqueue<'e, E>(
        executor: E,
        webhook_id: Uuid,
        event: &str,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, WebhookDelivery>(&format!(
            "INSERT INTO webhook_deliveries (id, webhook_id, event, payload, status, next_attempt_at)
             VALUES ($1, $2, $3, $4, 'pending', $5)
             RETURNING {DELIVERY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(webhook_id)
        .bind(event)
        .bind(Json(payload))
        .bind(now)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WebhookDelivery>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Newest first.
    pub async fn list_for_webhook(
        pool: &SqlitePool,
        webhook_id: Uuid,
        page: Page,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM webhook_deliveries WHERE webhook_id = $1",
        )
        .bind(webhook_id)
        .fetch_one(pool)
        .await?;

        let deliveries = sqlx::query_as::<_, WebhookDelivery>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries
             WHERE webhook_id = $1
             ORDER BY created_at DESC, id ASC
             LIMIT $2 OFFSET $3"
        ))
        .bind(webhook_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        Ok((deliveries, total))
    }

    /// Pending deliveries of active webhooks whose next attempt is due.
    pub async fn find_due(
        pool: &SqlitePool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DueDelivery>, sqlx::Error> {
        sqlx::query_as::<_, DueDelivery>(&format!(
            "SELECT {DUE_DELIVERY_COLUMNS}
             FROM webhook_deliveries d
             JOIN webhooks w ON w.id = d.webhook_id
             WHERE d.status = 'pending'
               AND w.is_active = 1
               AND d.next_attempt_at IS NOT NULL
               AND julianday(d.next_attempt_at) <= julianday($1)
             ORDER BY julianday(d.next_attempt_at) ASC
             LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Lease a due delivery by pushing its `next_attempt_at` to `lease_until`.
    ///
    /// Returns false when another worker claimed it first.
    pub async fn claim(
        pool: &SqlitePool,
        id: Uuid,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE webhook_deliveries
             SET next_attempt_at = $3, updated_at = datetime('now', 'subsec')
             WHERE id = $1
               AND status = 'pending'
               AND julianday(next_attempt_at) <= julianday($2)",
        )
        .bind(id)
        .bind(now)
        .bind(lease_until)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn record_success(
        pool: &SqlitePool,
        id: Uuid,
        attempts: i64,
        response_status: i64,
        response_body: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, WebhookDelivery>(&format!(
            "UPDATE webhook_deliveries
             SET status = 'delivered', attempts = $2, response_status = $3, response_body = $4,
                 error = NULL, next_attempt_at = NULL, delivered_at = $5,
                 updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {DELIVERY_COLUMNS}"
        ))
        .bind(id)
        .bind(attempts)
        .bind(response_status)
        .bind(response_body)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    /// Record a failed attempt. With `retry_at` the delivery stays pending,
    /// otherwise it is marked failed.
    pub async fn record_failure(
        pool: &SqlitePool,
        id: Uuid,
        attempts: i64,
        failure: &AttemptFailure,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<Self, sqlx::Error> {
        let status = if retry_at.is_some() {
            DeliveryStatus::Pending
        } else {
            DeliveryStatus::Failed
        };
        sqlx::query_as::<_, WebhookDelivery>(&format!(
            "UPDATE webhook_deliveries
             SET status = $2, attempts = $3, response_status = $4, response_body = $5,
                 error = $6, next_attempt_at = $7, updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {DELIVERY_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(attempts)
        .bind(failure.response_status)
        .bind(&failure.response_body)
        .bind(&failure.error)
        .bind(retry_at)
        .fetch_one(pool)
        .await
    }

    /// Put a failed delivery back in the queue with a fresh attempt budget.
    ///
    /// Returns `None` when the delivery is not in the `failed` state.
    pub async fn reset_for_retry(
        pool: &SqlitePool,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WebhookDelivery>(&format!(
            "UPDATE webhook_deliveries
             SET status = 'pending', attempts = 0, next_attempt_at = $2, error = NULL,
                 updated_at = datetime('now', 'subsec')
             WHERE id = $1 AND status = 'failed'
             RETURNING {DELIVERY_COLUMNS}"
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(pool)
        .await
    }
}
