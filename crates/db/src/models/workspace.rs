use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
    Default,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkspaceRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl WorkspaceRole {
    /// Owners and admins manage members, webhooks and pipelines.
    pub fn can_manage(self) -> bool {
        matches!(self, WorkspaceRole::Owner | WorkspaceRole::Admin)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct WorkspaceMember {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: WorkspaceRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateWorkspace {
    pub name: String,
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateWorkspace {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, TS)]
pub struct AddWorkspaceMember {
    pub email: String,
    #[serde(default)]
    pub role: WorkspaceRole,
}

/// Lowercase, ASCII alphanumerics separated by single dashes.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

const WORKSPACE_COLUMNS: &str = "id, name, slug, owner_id, created_at, updated_at";

impl Workspace {
    /// Create a workspace; the creator becomes its owner member.
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateWorkspace,
        owner_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let slug = match data.slug.as_deref().map(slugify) {
            Some(slug) if !slug.is_empty() => slug,
            _ => format!("{}-{}", slugify(&data.name), &id.simple().to_string()[..8]),
        };

        let mut tx = pool.begin().await?;
        let workspace = sqlx::query_as::<_, Workspace>(&format!(
            "INSERT INTO workspaces (id, name, slug, owner_id) VALUES ($1, $2, $3, $4)
             RETURNING {WORKSPACE_COLUMNS}"
        ))
        .bind(id)
        .bind(&data.name)
        .bind(&slug)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO workspace_members (workspace_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(owner_id)
            .bind(WorkspaceRole::Owner)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(workspace)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Workspace>(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Workspace>(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(pool)
        .await
    }

    /// Workspaces the user is a member of.
    pub async fn find_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Workspace>(
            r#"SELECT w.id, w.name, w.slug, w.owner_id, w.created_at, w.updated_at
            FROM workspaces w
            INNER JOIN workspace_members m ON m.workspace_id = w.id
            WHERE m.user_id = $1
            ORDER BY w.name ASC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateWorkspace,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        let name = data.name.as_ref().unwrap_or(&existing.name);

        sqlx::query_as::<_, Workspace>(&format!(
            "UPDATE workspaces SET name = $2, updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {WORKSPACE_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .fetch_one(pool)
        .await
    }

    /// The user's role in the workspace, or `None` when they are not a member.
    pub async fn role_of(
        pool: &SqlitePool,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WorkspaceRole>, sqlx::Error> {
        sqlx::query_scalar::<_, WorkspaceRole>(
            "SELECT role FROM workspace_members WHERE workspace_id = $1 AND user_id = $2",
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Add a member, or change the role of an existing one.
    pub async fn add_member(
        pool: &SqlitePool,
        workspace_id: Uuid,
        user_id: Uuid,
        role: WorkspaceRole,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO workspace_members (workspace_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (workspace_id, user_id) DO UPDATE SET role = excluded.role"#,
        )
        .bind(workspace_id)
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn remove_member(
        pool: &SqlitePool,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM workspace_members WHERE workspace_id = $1 AND user_id = $2")
                .bind(workspace_id)
                .bind(user_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }

    pub async fn members(
        pool: &SqlitePool,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceMember>, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceMember>(
            r#"SELECT m.workspace_id, m.user_id, u.name, u.email, m.role, m.created_at
            FROM workspace_members m
            INNER JOIN users u ON u.id = m.user_id
            WHERE m.workspace_id = $1
            ORDER BY m.created_at ASC"#,
        )
        .bind(workspace_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Acme Corp"), "acme-corp");
        assert_eq!(slugify("  Hello,  World!! "), "hello-world");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_role_permissions() {
        assert!(WorkspaceRole::Owner.can_manage());
        assert!(WorkspaceRole::Admin.can_manage());
        assert!(!WorkspaceRole::Member.can_manage());
        assert_eq!("admin".parse::<WorkspaceRole>().unwrap(), WorkspaceRole::Admin);
    }
}
