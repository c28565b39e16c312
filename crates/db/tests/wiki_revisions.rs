//! Integration tests for wiki revision storage and pruning.

use std::str::FromStr;

use db::models::{
    user::User,
    wiki::{CreateWiki, Wiki},
    wiki_revision::WikiRevision,
    workspace::{CreateWorkspace, Workspace},
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use tempfile::TempDir;
use utils::pagination::Page;

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


async fn create_wiki(pool: &SqlitePool) -> (User, Wiki) {
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

    let mut conn = pool.acquire().await.unwrap();
    let wiki = Wiki::create(
        &mut conn,
        workspace.id,
        &CreateWiki {
            title: "Handbook".to_string(),
            content: "v1".to_string(),
            project_id: None,
            parent_id: None,
            summary: None,
        },
        user.id,
    )
    .await
    .unwrap();
    (user, wiki)
}

/// Write `count` edits, each snapshotted as a revision.
async fn edit_times(pool: &SqlitePool, wiki: &Wiki, user: &User, count: usize) -> Wiki {
    let mut current = wiki.clone();
    for i in 0..count {
        let mut tx = pool.begin().await.unwrap();
        current = Wiki::update_content(
            &mut tx,
            current.id,
            &current.title,
            &format!("edit {i}"),
            current.parent_id,
            user.id,
        )
        .await
        .unwrap();
        WikiRevision::snapshot(&mut tx, &current, Some("edit"), Some(user.id))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }
    Wiki::find_by_id(pool, current.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_snapshot_numbers_increase() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let (user, wiki) = create_wiki(&pool).await;

    let wiki = edit_times(&pool, &wiki, &user, 3).await;
    assert_eq!(wiki.current_revision, 3);

    let latest = WikiRevision::latest_number(&pool, wiki.id).await.unwrap();
    assert_eq!(latest, Some(3));

    let second = WikiRevision::find_by_number(&pool, wiki.id, 2)
        .await
        .unwrap()
        .expect("revision 2 should exist");
    assert_eq!(second.content, "edit 1");
}

#[tokio::test]
async fn test_list_is_newest_first_and_paginated() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let (user, wiki) = create_wiki(&pool).await;
    let wiki = edit_times(&pool, &wiki, &user, 5).await;

    let (revisions, total) = WikiRevision::list_for_wiki(&pool, wiki.id, Page::new(1, 2))
        .await
        .unwrap();
    assert_eq!(total, 5);
    let numbers: Vec<i64> = revisions.iter().map(|r| r.revision_number).collect();
    assert_eq!(numbers, vec![5, 4]);
}

#[tokio::test]
async fn test_prune_keeps_newest_and_numbers_continue() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let (user, wiki) = create_wiki(&pool).await;
    let wiki = edit_times(&pool, &wiki, &user, 6).await;

    let exceeding = WikiRevision::wikis_exceeding(&pool, 2).await.unwrap();
    assert_eq!(exceeding.len(), 1);
    assert_eq!(exceeding[0].revisions, 6);

    let removed = WikiRevision::prune(&pool, wiki.id, 2).await.unwrap();
    assert_eq!(removed, 4);
    assert!(WikiRevision::wikis_exceeding(&pool, 2).await.unwrap().is_empty());

    // Pruned numbers are never reissued.
    let wiki = edit_times(&pool, &wiki, &user, 1).await;
    assert_eq!(wiki.current_revision, 7);
    let (revisions, _) = WikiRevision::list_for_wiki(&pool, wiki.id, Page::new(1, 10))
        .await
        .unwrap();
    let numbers: Vec<i64> = revisions.iter().map(|r| r.revision_number).collect();
    assert_eq!(numbers, vec![7, 6, 5]);
}

#[tokio::test]
async fn test_is_ancestor_detects_cycles() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let (user, root) = create_wiki(&pool).await;

    let mut conn = pool.acquire().await.unwrap();
    let child = Wiki::create(
        &mut conn,
        root.workspace_id,
        &CreateWiki {
            title: "Onboarding".to_string(),
            content: String::new(),
            project_id: None,
            parent_id: Some(root.id),
            summary: None,
        },
        user.id,
    )
    .await
    .unwrap();
    drop(conn);

    assert!(Wiki::is_ancestor(&pool, root.id, child.id).await.unwrap());
    assert!(Wiki::is_ancestor(&pool, child.id, child.id).await.unwrap());
    assert!(!Wiki::is_ancestor(&pool, child.id, root.id).await.unwrap());
}
