//! Parent/child operations over the task tree.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::{TASK_COLUMNS, Task};

impl Task {
    /// Direct, live children of a task.
    pub async fn find_children(
        pool: &SqlitePool,
        parent_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE parent_id = $1 AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(parent_id)
        .fetch_all(pool)
        .await
    }

    /// True when `ancestor_id` is `task_id` itself or appears on its parent chain.
    ///
    /// Used before re-parenting: making `task` a child of `parent` is a cycle
    /// exactly when `is_ancestor(task, parent)` holds.
    pub async fn is_ancestor(
        pool: &SqlitePool,
        ancestor_id: Uuid,
        task_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "WITH RECURSIVE chain(id, parent_id) AS (
                 SELECT id, parent_id FROM tasks WHERE id = $2
                 UNION
                 SELECT t.id, t.parent_id FROM tasks t JOIN chain c ON t.id = c.parent_id
             )
             SELECT EXISTS(SELECT 1 FROM chain WHERE id = $1)",
        )
        .bind(ancestor_id)
        .bind(task_id)
        .fetch_one(pool)
        .await
    }

    /// Soft-delete a task together with all of its descendants.
    pub async fn soft_delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM tasks WHERE id = $1 AND deleted_at IS NULL
                 UNION
                 SELECT t.id FROM tasks t JOIN subtree s ON t.parent_id = s.id
                 WHERE t.deleted_at IS NULL
             )
             UPDATE tasks
             SET deleted_at = datetime('now', 'subsec'), updated_at = datetime('now', 'subsec')
             WHERE id IN (SELECT id FROM subtree)",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
