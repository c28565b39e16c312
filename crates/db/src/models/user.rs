use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Prefix on issued tokens so they are recognisable in logs and secret scanners.
const TOKEN_PREFIX: &str = "orb_";

pub const LAST_USED_RESOLUTION_SECS: i64 = 60;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A personal access token. The plaintext is only available at issue time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ApiToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct TokenOwner {
    #[sqlx(flatten)]
    user: User,
    token_last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: ApiToken,
    pub plain_text: String,
}

pub fn hash_token(plain_text: &str) -> String {
    hex::encode(Sha256::digest(plain_text.as_bytes()))
}

impl User {
    pub async fn create(pool: &SqlitePool, name: &str, email: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"INSERT INTO users (id, name, email)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email.to_lowercase())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email.to_lowercase())
        .fetch_optional(pool)
        .await
    }

    /// Resolve a bearer token to its owner. `last_used_at` is refreshed at most
    /// once per [`LAST_USED_RESOLUTION_SECS`] so reads stay off the write lock.
    pub async fn find_by_token(
        pool: &SqlitePool,
        plain_text: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let token_hash = hash_token(plain_text);
        let owner = sqlx::query_as::<_, TokenOwner>(
            r#"SELECT u.id, u.name, u.email, u.created_at, u.updated_at,
                   t.last_used_at AS token_last_used_at
            FROM users u
            INNER JOIN api_tokens t ON t.user_id = u.id
            WHERE t.token_hash = $1"#,
        )
        .bind(&token_hash)
        .fetch_optional(pool)
        .await?;

        let Some(owner) = owner else {
            return Ok(None);
        };

        let stale = owner
            .token_last_used_at
            .is_none_or(|at| (Utc::now() - at).num_seconds() >= LAST_USED_RESOLUTION_SECS);
        if stale {
            sqlx::query(
                "UPDATE api_tokens SET last_used_at = datetime('now', 'subsec') WHERE token_hash = $1",
            )
            .bind(&token_hash)
            .execute(pool)
            .await?;
        }

        Ok(Some(owner.user))
    }
}

impl ApiToken {
    /// Issue a new token for `user_id`. Only the SHA-256 of the token is stored.
    pub async fn issue(
        pool: &SqlitePool,
        user_id: Uuid,
        label: &str,
    ) -> Result<IssuedToken, sqlx::Error> {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let plain_text = format!("{TOKEN_PREFIX}{}", hex::encode(bytes));

        let token = sqlx::query_as::<_, ApiToken>(
            r#"INSERT INTO api_tokens (id, user_id, label, token_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, label, last_used_at, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(label)
        .bind(hash_token(&plain_text))
        .fetch_one(pool)
        .await?;

        Ok(IssuedToken { token, plain_text })
    }

    pub async fn find_by_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiToken>(
            r#"SELECT id, user_id, label, last_used_at, created_at
            FROM api_tokens
            WHERE user_id = $1
            ORDER BY created_at ASC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_stable_hex() {
        let a = hash_token("orb_abc");
        assert_eq!(a, hash_token("orb_abc"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_token("orb_abd"));
    }
}
