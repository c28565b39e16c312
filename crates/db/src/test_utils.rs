//! Test utilities for database tests.
//!
//! Pools are copied from a template database that has migrations applied once
//! per test binary. Fixture helpers seed the rows most tests need.

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::models::{
    project::{CreateProject, Project},
    user::User,
    workspace::{CreateWorkspace, Workspace},
};

static TEMPLATE_DIR: OnceLock<TempDir> = OnceLock::new();
static TEMPLATE_READY: OnceCell<()> = OnceCell::const_new();

fn get_template_dir() -> &'static TempDir {
    TEMPLATE_DIR.get_or_init(|| TempDir::new().expect("Failed to create template temp dir"))
}

async fn ensure_template_ready() {
    TEMPLATE_READY
        .get_or_init(|| async {
            let template_path = get_template_dir().path().join("template.db");

            let options =
                SqliteConnectOptions::from_str(&format!("sqlite://{}", template_path.display()))
                    .expect("Invalid template database URL")
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Delete);

            let pool = SqlitePoolOptions::new()
                .min_connections(0)
                .max_connections(1)
                .connect_with(options)
                .await
                .expect("Failed to create template pool");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations on template");

            pool.close().await;
            tracing::debug!("Template database ready at {:?}", template_path);
        })
        .await;
}

/// Create a migrated test database pool.
///
/// Returns the pool and a TempDir that must be kept alive for the duration of the test.
pub async fn create_test_pool() -> (SqlitePool, TempDir) {
    ensure_template_ready().await;

    let temp_dir = TempDir::new().expect("Failed to create test temp dir");
    let db_path = temp_dir.path().join("test.db");
    let template_path = get_template_dir().path().join("template.db");
    std::fs::copy(&template_path, &db_path).expect("Failed to copy template database");

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
        .expect("Invalid test database URL")
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .expect("Failed to create test pool");

    (pool, temp_dir)
}

/// A user owning one workspace.
pub struct Fixture {
    pub user: User,
    pub workspace: Workspace,
}

pub async fn seed_user(pool: &SqlitePool, name: &str) -> User {
    let email = format!("{}-{}@example.test", name.to_lowercase(), &Uuid::new_v4().simple().to_string()[..8]);
    User::create(pool, name, &email)
        .await
        .expect("Failed to create user")
}

pub async fn seed_workspace(pool: &SqlitePool, owner: &User, name: &str) -> Workspace {
    Workspace::create(
        pool,
        &CreateWorkspace {
            name: name.to_string(),
            slug: None,
        },
        owner.id,
    )
    .await
    .expect("Failed to create workspace")
}

pub async fn seed_project(pool: &SqlitePool, workspace_id: Uuid, pipeline_id: Option<Uuid>) -> Project {
    Project::create(
        pool,
        workspace_id,
        &CreateProject {
            name: "Launch".to_string(),
            description: None,
            pipeline_id,
        },
    )
    .await
    .expect("Failed to create project")
}

pub async fn seed_fixture(pool: &SqlitePool) -> Fixture {
    let user = seed_user(pool, "Ada").await;
    let workspace = seed_workspace(pool, &user, "Acme").await;
    Fixture { user, workspace }
}
