use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use ts_rs::TS;
use utils::nullable::{self, Nullable};
use uuid::Uuid;

/// Subscription wildcard matching every event.
pub const ALL_EVENTS: &str = "*";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Webhook {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub url: String,
    /// HMAC key; only revealed once, in [`CreatedWebhook`]
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    pub secret: String,
    #[sqlx(json)]
    pub events: Vec<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event || e == ALL_EVENTS)
    }
}

/// Creation response carrying the signing secret.
#[derive(Debug, Clone, Serialize, TS)]
pub struct CreatedWebhook {
    #[serde(flatten)]
    #[ts(flatten)]
    pub webhook: Webhook,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateWebhook {
    pub url: String,
    pub events: Vec<String>,
    pub description: Option<String>,
    /// Generated when absent
    pub secret: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateWebhook {
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub description: Nullable<String>,
    pub is_active: Option<bool>,
}

const WEBHOOK_COLUMNS: &str =
    "id, workspace_id, url, secret, events, description, is_active, created_at, updated_at";

impl Webhook {
    pub async fn create(
        pool: &SqlitePool,
        workspace_id: Uuid,
        data: &CreateWebhook,
        secret: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Webhook>(&format!(
            "INSERT INTO webhooks (id, workspace_id, url, secret, events, description, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {WEBHOOK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(&data.url)
        .bind(secret)
        .bind(Json(&data.events))
        .bind(&data.description)
        .bind(data.is_active)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Webhook>(&format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_workspace(
        pool: &SqlitePool,
        workspace_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Webhook>(&format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks
             WHERE workspace_id = $1
             ORDER BY created_at ASC"
        ))
        .bind(workspace_id)
        .fetch_all(pool)
        .await
    }

    /// Active webhooks of a workspace listening for `event` (or for everything).
    pub async fn find_subscribed(
        pool: &SqlitePool,
        workspace_id: Uuid,
        event: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Webhook>(&format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks
             WHERE workspace_id = $1
               AND is_active = 1
               AND EXISTS (
                   SELECT 1 FROM json_each(webhooks.events)
                   WHERE json_each.value = $2 OR json_each.value = '{ALL_EVENTS}'
               )
             ORDER BY created_at ASC"
        ))
        .bind(workspace_id)
        .bind(event)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateWebhook,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        let url = data.url.as_ref().unwrap_or(&existing.url);
        let events = data.events.as_ref().unwrap_or(&existing.events);
        let description = nullable::apply(&data.description, &existing.description);
        let is_active = data.is_active.unwrap_or(existing.is_active);

        sqlx::query_as::<_, Webhook>(&format!(
            "UPDATE webhooks
             SET url = $2, events = $3, description = $4, is_active = $5,
                 updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {WEBHOOK_COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .bind(Json(events))
        .bind(description)
        .bind(is_active)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
