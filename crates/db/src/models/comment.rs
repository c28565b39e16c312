//! Comments attach to any commentable record through `(entity_type, entity_id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use utils::pagination::Page;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityType {
    Project,
    Task,
    Wiki,
    Milestone,
}

/// A reference to one commentable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "entity_type", content = "entity_id", rename_all = "lowercase")]
pub enum EntityRef {
    Project(Uuid),
    Task(Uuid),
    Wiki(Uuid),
    Milestone(Uuid),
}

impl EntityRef {
    pub fn new(entity_type: EntityType, entity_id: Uuid) -> Self {
        match entity_type {
            EntityType::Project => EntityRef::Project(entity_id),
            EntityType::Task => EntityRef::Task(entity_id),
            EntityType::Wiki => EntityRef::Wiki(entity_id),
            EntityType::Milestone => EntityRef::Milestone(entity_id),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRef::Project(_) => EntityType::Project,
            EntityRef::Task(_) => EntityType::Task,
            EntityRef::Wiki(_) => EntityType::Wiki,
            EntityRef::Milestone(_) => EntityType::Milestone,
        }
    }

    pub fn entity_id(&self) -> Uuid {
        match *self {
            EntityRef::Project(id)
            | EntityRef::Task(id)
            | EntityRef::Wiki(id)
            | EntityRef::Milestone(id) => id,
        }
    }

    /// Workspace owning the referenced record, if it exists and is live.
    pub async fn resolve_workspace(&self, pool: &SqlitePool) -> Result<Option<Uuid>, sqlx::Error> {
        let sql = match self {
            EntityRef::Project(_) => {
                "SELECT workspace_id FROM projects WHERE id = $1 AND deleted_at IS NULL"
            }
            EntityRef::Task(_) => {
                "SELECT p.workspace_id FROM tasks t
                 JOIN projects p ON p.id = t.project_id
                 WHERE t.id = $1 AND t.deleted_at IS NULL AND p.deleted_at IS NULL"
            }
            EntityRef::Wiki(_) => "SELECT workspace_id FROM wikis WHERE id = $1",
            EntityRef::Milestone(_) => {
                "SELECT p.workspace_id FROM milestones m
                 JOIN projects p ON p.id = m.project_id
                 WHERE m.id = $1 AND p.deleted_at IS NULL"
            }
        };
        sqlx::query_scalar::<_, Uuid>(sql)
            .bind(self.entity_id())
            .fetch_optional(pool)
            .await
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Comment {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub author_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.entity_id)
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateComment {
    pub body: String,
}

const COMMENT_COLUMNS: &str =
    "id, workspace_id, entity_type, entity_id, author_id, body, created_at, updated_at";

impl Comment {
    pub async fn create(
        pool: &SqlitePool,
        workspace_id: Uuid,
        entity: EntityRef,
        author_id: Uuid,
        body: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Comment>(&format!(
            "INSERT INTO comments (id, workspace_id, entity_type, entity_id, author_id, body)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(entity.entity_type())
        .bind(entity.entity_id())
        .bind(author_id)
        .bind(body)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Oldest first.
    pub async fn list_for_entity(
        pool: &SqlitePool,
        entity: EntityRef,
        page: Page,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM comments WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity.entity_type())
        .bind(entity.entity_id())
        .fetch_one(pool)
        .await?;

        let comments = sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments
             WHERE entity_type = $1 AND entity_id = $2
             ORDER BY created_at ASC, id ASC
             LIMIT $3 OFFSET $4"
        ))
        .bind(entity.entity_type())
        .bind(entity.entity_id())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        Ok((comments, total))
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ref_parts_round_trip() {
        let id = Uuid::new_v4();
        let entity = EntityRef::new(EntityType::Wiki, id);
        assert_eq!(entity, EntityRef::Wiki(id));
        assert_eq!(entity.entity_type(), EntityType::Wiki);
        assert_eq!(entity.entity_id(), id);
    }

    #[test]
    fn entity_ref_serializes_as_tagged_pair() {
        let id = Uuid::nil();
        let json = serde_json::to_value(EntityRef::Task(id)).unwrap();
        assert_eq!(json["entity_type"], "task");
        assert_eq!(json["entity_id"], id.to_string());
    }
}
