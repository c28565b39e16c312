//! Integration tests for task listing, hierarchy and recurrence storage.

use std::str::FromStr;

use chrono::NaiveDate;
use db::models::{
    project::{CreateProject, Project, ProjectFilter},
    task::{
        CreateTask, Frequency, Task, TaskFilter, TaskPriority, TaskRecurrence, UpsertRecurrence,
        Weekday,
    },
    user::User,
    workspace::{CreateWorkspace, Workspace},
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use tempfile::TempDir;
use utils::pagination::Page;
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


async fn create_project(pool: &SqlitePool) -> Project {
    let user = User::create(pool, "Ada", "ada@example.test").await.unwrap();
    let workspace = Workspace::create(
        pool,
        &CreateWorkspace {
            name: "Acme".to_string(),
            slug: None,
        },
        user.id,
    )
    .await
    .unwrap();
    Project::create(
        pool,
        workspace.id,
        &CreateProject {
            name: "Launch".to_string(),
            description: None,
            pipeline_id: None,
        },
    )
    .await
    .unwrap()
}

async fn create_task(pool: &SqlitePool, project_id: Uuid, title: &str, parent_id: Option<Uuid>) -> Task {
    Task::create(
        pool,
        project_id,
        &CreateTask {
            title: title.to_string(),
            description: None,
            parent_id,
            status_id: None,
            milestone_id: None,
            priority: TaskPriority::High,
            due_on: None,
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_filters_and_pagination() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let project = create_project(&pool).await;
    let parent = create_task(&pool, project.id, "Parent", None).await;
    create_task(&pool, project.id, "Child", Some(parent.id)).await;
    let done = create_task(&pool, project.id, "Done", None).await;
    Task::set_completed(&pool, done.id, true, None).await.unwrap();

    let (all, total) = Task::list_for_project(&pool, project.id, &TaskFilter::default(), Page::new(1, 2))
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(all.len(), 2);

    let open_top_level = TaskFilter {
        top_level_only: true,
        include_completed: false,
        ..Default::default()
    };
    let (tasks, total) = Task::list_for_project(&pool, project.id, &open_top_level, Page::new(1, 10))
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(tasks[0].id, parent.id);

    let children = TaskFilter {
        parent_id: Some(parent.id),
        ..Default::default()
    };
    let (tasks, _) = Task::list_for_project(&pool, project.id, &children, Page::new(1, 10))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Child");
}

#[tokio::test]
async fn test_soft_delete_cascades_to_descendants() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let project = create_project(&pool).await;
    let root = create_task(&pool, project.id, "Root", None).await;
    let child = create_task(&pool, project.id, "Child", Some(root.id)).await;
    let grandchild = create_task(&pool, project.id, "Grandchild", Some(child.id)).await;
    let sibling = create_task(&pool, project.id, "Sibling", None).await;

    let deleted = Task::soft_delete(&pool, root.id).await.unwrap();
    assert_eq!(deleted, 3);

    assert!(Task::find_by_id(&pool, grandchild.id).await.unwrap().is_none());
    assert!(Task::find_by_id(&pool, sibling.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_project_soft_delete_hides_project_and_tasks() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let project = create_project(&pool).await;
    let task = create_task(&pool, project.id, "Task", None).await;

    Project::soft_delete(&pool, project.id).await.unwrap();

    assert!(Project::find_by_id(&pool, project.id).await.unwrap().is_none());
    assert!(Task::find_by_id(&pool, task.id).await.unwrap().is_none());
    let (projects, total) = Project::list_for_workspace(
        &pool,
        project.workspace_id,
        &ProjectFilter::default(),
        Page::new(1, 10),
    )
    .await
    .unwrap();
    assert!(projects.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_is_ancestor() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let project = create_project(&pool).await;
    let root = create_task(&pool, project.id, "Root", None).await;
    let child = create_task(&pool, project.id, "Child", Some(root.id)).await;
    let grandchild = create_task(&pool, project.id, "Grandchild", Some(child.id)).await;

    assert!(Task::is_ancestor(&pool, root.id, grandchild.id).await.unwrap());
    assert!(!Task::is_ancestor(&pool, grandchild.id, root.id).await.unwrap());

    let children = Task::find_children(&pool, root.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, child.id);
}

#[tokio::test]
async fn test_recurrence_upsert_and_advance() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let project = create_project(&pool).await;
    let task = create_task(&pool, project.id, "Standup notes", None).await;
    let starts_on = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();

    let rule = UpsertRecurrence {
        frequency: Frequency::Weekly,
        interval: 1,
        days_of_week: vec![Weekday::Friday, Weekday::Monday, Weekday::Friday],
        day_of_month: None,
        starts_on,
        ends_on: None,
        max_occurrences: Some(4),
    };
    let recurrence = TaskRecurrence::upsert(&pool, task.id, &rule, Some(starts_on))
        .await
        .unwrap();
    assert_eq!(recurrence.days_of_week, vec![Weekday::Monday, Weekday::Friday]);
    assert_eq!(recurrence.occurrences_count, 1);
    assert_eq!(recurrence.frequency, Frequency::Weekly);

    let next_task = create_task(&pool, project.id, "Standup notes", None).await;
    let next_due = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
    let advanced = TaskRecurrence::advance(&pool, recurrence.id, next_task.id, Some(next_due))
        .await
        .unwrap();
    assert_eq!(advanced.task_id, next_task.id);
    assert_eq!(advanced.occurrences_count, 2);
    assert_eq!(advanced.next_due_on, Some(next_due));

    assert!(TaskRecurrence::find_by_task(&pool, task.id).await.unwrap().is_none());

    // Re-upserting keeps the count.
    let updated = TaskRecurrence::upsert(&pool, next_task.id, &rule, Some(next_due))
        .await
        .unwrap();
    assert_eq!(updated.id, recurrence.id);
    assert_eq!(updated.occurrences_count, 2);
}
