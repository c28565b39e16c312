//! Wiki editing, restore, diff and revision cleanup.

use db::{
    models::{
        wiki::{CreateWiki, UpdateWiki, Wiki},
        wiki_revision::WikiRevision,
    },
    test_utils::{Fixture, create_test_pool, seed_fixture},
};
use services::services::wiki::{self, WikiError};
use sqlx::SqlitePool;

async fn create_page(pool: &SqlitePool, fixture: &Fixture, title: &str, content: &str) -> Wiki {
    wiki::create_wiki(
        pool,
        fixture.workspace.id,
        &CreateWiki {
            title: title.to_string(),
            content: content.to_string(),
            project_id: None,
            parent_id: None,
            summary: None,
        },
        fixture.user.id,
    )
    .await
    .unwrap()
    .wiki
}

async fn edit(pool: &SqlitePool, fixture: &Fixture, page: &Wiki, content: &str) -> Wiki {
    wiki::update_wiki(
        pool,
        page,
        &UpdateWiki {
            content: Some(content.to_string()),
            ..Default::default()
        },
        fixture.user.id,
    )
    .await
    .unwrap()
    .wiki
}

#[tokio::test]
async fn test_create_records_first_revision() {
    let (pool, _dir) = create_test_pool().await;
    let fixture = seed_fixture(&pool).await;

    let created = wiki::create_wiki(
        &pool,
        fixture.workspace.id,
        &CreateWiki {
            title: "Runbook".to_string(),
            content: "step one".to_string(),
            project_id: None,
            parent_id: None,
            summary: None,
        },
        fixture.user.id,
    )
    .await
    .unwrap();

    let revision = created.revision.unwrap();
    assert_eq!(revision.revision_number, 1);
    assert_eq!(revision.summary.as_deref(), Some("Initial version"));
    assert_eq!(created.wiki.current_revision, 1);
}

#[tokio::test]
async fn test_noop_update_skips_revision() {
    let (pool, _dir) = create_test_pool().await;
    let fixture = seed_fixture(&pool).await;
    let page = create_page(&pool, &fixture, "Runbook", "step one").await;

    let update = wiki::update_wiki(
        &pool,
        &page,
        &UpdateWiki {
            content: Some("step one".to_string()),
            ..Default::default()
        },
        fixture.user.id,
    )
    .await
    .unwrap();
    assert!(update.revision.is_none());
    assert_eq!(WikiRevision::count_for_wiki(&pool, page.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_restore_and_diff() {
    let (pool, _dir) = create_test_pool().await;
    let fixture = seed_fixture(&pool).await;
    let page = create_page(&pool, &fixture, "Runbook", "step one\nstep two").await;
    let page = edit(&pool, &fixture, &page, "step one\nstep 2\nstep three").await;
    assert_eq!(page.current_revision, 2);

    let diff = wiki::diff_revisions(&pool, &page, 1, 2).await.unwrap();
    assert_eq!(diff.diff.stats.additions, 2);
    assert_eq!(diff.diff.stats.deletions, 1);

    let restored = wiki::restore_revision(&pool, &page, 1, fixture.user.id)
        .await
        .unwrap();
    assert_eq!(restored.wiki.content, "step one\nstep two");
    let revision = restored.revision.unwrap();
    assert_eq!(revision.revision_number, 3);
    assert_eq!(revision.summary.as_deref(), Some("Restored from revision 1"));

    let err = wiki::restore_revision(&pool, &restored.wiki, 9, fixture.user.id)
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::RevisionNotFound(9)));
}

#[tokio::test]
async fn test_parent_cannot_be_descendant() {
    let (pool, _dir) = create_test_pool().await;
    let fixture = seed_fixture(&pool).await;
    let root = create_page(&pool, &fixture, "Handbook", "").await;
    let child = wiki::create_wiki(
        &pool,
        fixture.workspace.id,
        &CreateWiki {
            title: "Onboarding".to_string(),
            content: String::new(),
            project_id: None,
            parent_id: Some(root.id),
            summary: None,
        },
        fixture.user.id,
    )
    .await
    .unwrap()
    .wiki;

    let err = wiki::update_wiki(
        &pool,
        &root,
        &UpdateWiki {
            parent_id: Some(Some(child.id)),
            ..Default::default()
        },
        fixture.user.id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WikiError::Validation(ref e) if e.has("parent_id")));
}

#[tokio::test]
async fn test_null_parent_moves_page_to_root() {
    let (pool, _dir) = create_test_pool().await;
    let fixture = seed_fixture(&pool).await;
    let root = create_page(&pool, &fixture, "Handbook", "").await;
    let child = wiki::create_wiki(
        &pool,
        fixture.workspace.id,
        &CreateWiki {
            title: "Onboarding".to_string(),
            content: "day one".to_string(),
            project_id: None,
            parent_id: Some(root.id),
            summary: None,
        },
        fixture.user.id,
    )
    .await
    .unwrap()
    .wiki;

    let moved = wiki::update_wiki(
        &pool,
        &child,
        &UpdateWiki {
            parent_id: Some(None),
            ..Default::default()
        },
        fixture.user.id,
    )
    .await
    .unwrap();
    assert_eq!(moved.wiki.parent_id, None);
    assert!(moved.revision.is_none());
}

#[tokio::test]
async fn test_cleanup_dry_run_then_prune() {
    let (pool, _dir) = create_test_pool().await;
    let fixture = seed_fixture(&pool).await;
    let mut page = create_page(&pool, &fixture, "Changelog", "v0").await;
    for n in 1..5 {
        page = edit(&pool, &fixture, &page, &format!("v{n}")).await;
    }
    create_page(&pool, &fixture, "Small", "only one").await;

    let preview = wiki::cleanup_revisions(&pool, 2, true).await.unwrap();
    assert!(preview.dry_run);
    assert_eq!(preview.total_removed, 3);
    assert_eq!(preview.wikis.len(), 1);
    assert_eq!(WikiRevision::count_for_wiki(&pool, page.id).await.unwrap(), 5);

    let report = wiki::cleanup_revisions(&pool, 2, false).await.unwrap();
    assert_eq!(report.total_removed, 3);
    assert_eq!(WikiRevision::count_for_wiki(&pool, page.id).await.unwrap(), 2);
    assert_eq!(WikiRevision::latest_number(&pool, page.id).await.unwrap(), Some(5));

    let err = wiki::cleanup_revisions(&pool, 0, false).await.unwrap_err();
    assert!(matches!(err, WikiError::Validation(ref e) if e.has("keep")));
}
