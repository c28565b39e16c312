//! Integration tests for pipeline/status ordering.
//!
//! Positions inside a pipeline must stay dense (`0..n-1`) after every
//! attach, detach, reorder and status deletion.

use std::str::FromStr;

use db::models::{
    pipeline::{CreatePipeline, CreateStatus, Pipeline, Status},
    user::User,
    workspace::{CreateWorkspace, Workspace},
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use tempfile::TempDir;
use uuid::Uuid;

async fn setup_test_pool() -> (SqlitePool, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");

    let options =
        SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.to_string_lossy()))
            .expect("Invalid database URL")
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePool::connect_with(options)
        .await
        .expect("Failed to create pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    (pool, temp_dir)
}

async fn create_workspace(pool: &SqlitePool) -> Workspace {
    let user = User::create(pool, "Ada", "ada@example.test")
        .await
        .expect("Failed to create user");
    Workspace::create(
        pool,
        &CreateWorkspace {
            name: "Acme".to_string(),
            slug: None,
        },
        user.id,
    )
    .await
    .expect("Failed to create workspace")
}

async fn create_statuses(pool: &SqlitePool, workspace_id: Uuid, names: &[&str]) -> Vec<Status> {
    let mut statuses = Vec::new();
    for name in names {
        let status = Status::create(
            pool,
            workspace_id,
            &CreateStatus {
                name: name.to_string(),
                color: "#6b7280".to_string(),
                is_completed: *name == "Done",
            },
        )
        .await
        .expect("Failed to create status");
        statuses.push(status);
    }
    statuses
}

async fn create_pipeline(pool: &SqlitePool, workspace_id: Uuid, status_ids: Vec<Uuid>) -> Pipeline {
    let mut conn = pool.acquire().await.unwrap();
    let pipeline = Pipeline::create(
        &mut conn,
        workspace_id,
        &CreatePipeline {
            name: "Delivery".to_string(),
            description: None,
            status_ids: status_ids.clone(),
        },
    )
    .await
    .expect("Failed to create pipeline");
    for status_id in status_ids {
        Pipeline::attach_status(&mut conn, pipeline.id, status_id)
            .await
            .expect("Failed to attach status");
    }
    pipeline
}

async fn ordered(pool: &SqlitePool, pipeline_id: Uuid) -> Vec<(Uuid, i64)> {
    let mut conn = pool.acquire().await.unwrap();
    Pipeline::statuses(&mut conn, pipeline_id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| (s.status.id, s.position))
        .collect()
}

#[tokio::test]
async fn test_attach_appends_at_end() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let workspace = create_workspace(&pool).await;
    let statuses = create_statuses(&pool, workspace.id, &["Todo", "Doing", "Done"]).await;
    let ids: Vec<Uuid> = statuses.iter().map(|s| s.id).collect();

    let pipeline = create_pipeline(&pool, workspace.id, ids.clone()).await;

    let order = ordered(&pool, pipeline.id).await;
    assert_eq!(
        order,
        vec![(ids[0], 0), (ids[1], 1), (ids[2], 2)],
        "statuses should be positioned in attach order"
    );
}

#[tokio::test]
async fn test_attach_twice_is_noop() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let workspace = create_workspace(&pool).await;
    let statuses = create_statuses(&pool, workspace.id, &["Todo", "Done"]).await;
    let pipeline = create_pipeline(&pool, workspace.id, vec![statuses[0].id]).await;

    let mut conn = pool.acquire().await.unwrap();
    let attached = Pipeline::attach_status(&mut conn, pipeline.id, statuses[0].id)
        .await
        .unwrap();
    assert!(!attached, "re-attaching must not create a second row");
    drop(conn);

    assert_eq!(ordered(&pool, pipeline.id).await.len(), 1);
}

#[tokio::test]
async fn test_detach_compacts_positions() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let workspace = create_workspace(&pool).await;
    let statuses = create_statuses(&pool, workspace.id, &["Todo", "Doing", "Review", "Done"]).await;
    let ids: Vec<Uuid> = statuses.iter().map(|s| s.id).collect();
    let pipeline = create_pipeline(&pool, workspace.id, ids.clone()).await;

    let removed = Pipeline::detach_status(&pool, pipeline.id, ids[1]).await.unwrap();
    assert!(removed);

    let order = ordered(&pool, pipeline.id).await;
    assert_eq!(order, vec![(ids[0], 0), (ids[2], 1), (ids[3], 2)]);
}

#[tokio::test]
async fn test_write_order_rewrites_positions() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let workspace = create_workspace(&pool).await;
    let statuses = create_statuses(&pool, workspace.id, &["Todo", "Doing", "Done"]).await;
    let ids: Vec<Uuid> = statuses.iter().map(|s| s.id).collect();
    let pipeline = create_pipeline(&pool, workspace.id, ids.clone()).await;

    let reversed = vec![ids[2], ids[1], ids[0]];
    let mut tx = pool.begin().await.unwrap();
    Pipeline::write_order(&mut tx, pipeline.id, &reversed).await.unwrap();
    tx.commit().await.unwrap();

    let order = ordered(&pool, pipeline.id).await;
    assert_eq!(order, vec![(ids[2], 0), (ids[1], 1), (ids[0], 2)]);
}

#[tokio::test]
async fn test_deleting_status_compacts_every_pipeline() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let workspace = create_workspace(&pool).await;
    let statuses = create_statuses(&pool, workspace.id, &["Todo", "Doing", "Done"]).await;
    let ids: Vec<Uuid> = statuses.iter().map(|s| s.id).collect();
    let first = create_pipeline(&pool, workspace.id, ids.clone()).await;
    let second = create_pipeline(&pool, workspace.id, vec![ids[1], ids[0]]).await;

    Status::delete(&pool, ids[0]).await.unwrap();

    assert_eq!(ordered(&pool, first.id).await, vec![(ids[1], 0), (ids[2], 1)]);
    assert_eq!(ordered(&pool, second.id).await, vec![(ids[1], 0)]);
}

#[tokio::test]
async fn test_first_and_completed_status() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let workspace = create_workspace(&pool).await;
    let statuses = create_statuses(&pool, workspace.id, &["Todo", "Doing", "Done"]).await;
    let ids: Vec<Uuid> = statuses.iter().map(|s| s.id).collect();
    let pipeline = create_pipeline(&pool, workspace.id, ids.clone()).await;

    let first = Pipeline::first_status(&pool, pipeline.id).await.unwrap();
    assert_eq!(first.map(|s| s.id), Some(ids[0]));

    let completed = Pipeline::completed_status(&pool, pipeline.id).await.unwrap();
    assert_eq!(completed.map(|s| s.id), Some(ids[2]));
}
