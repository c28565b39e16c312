//! Wiki editing with revision history.
//!
//! Every content change is snapshotted in the same transaction that writes the
//! page, so `wikis.current_revision` always names the newest stored revision.

use db::{
    models::{
        project::Project,
        wiki::{CreateWiki, UpdateWiki, Wiki},
        wiki_revision::WikiRevision,
    },
    validation::ValidationErrors,
};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use utils::{
    nullable,
    text_diff::{LineDiff, diff_lines},
};
use uuid::Uuid;

use super::webhooks::{self, WebhookEvent};

const INITIAL_SUMMARY: &str = "Initial version";

#[derive(Debug, Error)]
pub enum WikiError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("Revision {0} not found")]
    RevisionNotFound(i64),
}

/// Result of an edit. `revision` is `None` when nothing changed.
#[derive(Debug, Clone, Serialize, TS)]
pub struct WikiUpdate {
    pub wiki: Wiki,
    pub revision: Option<WikiRevision>,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct WikiDiff {
    pub wiki_id: Uuid,
    pub from: i64,
    pub to: i64,
    pub diff: LineDiff,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct PrunedWiki {
    pub wiki_id: Uuid,
    pub stored: i64,
    pub removed: i64,
}

#[derive(Debug, Clone, Default, Serialize, TS)]
pub struct CleanupReport {
    pub keep: i64,
    pub dry_run: bool,
    pub wikis: Vec<PrunedWiki>,
    pub total_removed: i64,
}

fn validate_title(errors: &mut ValidationErrors, title: &str) {
    errors.required("title", title);
    errors.max_len("title", title, 255);
}

fn validate_summary(errors: &mut ValidationErrors, summary: Option<&str>) {
    if let Some(summary) = summary {
        errors.max_len("summary", summary, 255);
    }
}

/// Parent must be a page of the same workspace that is not `wiki_id` or one of its descendants.
async fn check_parent(
    pool: &SqlitePool,
    errors: &mut ValidationErrors,
    workspace_id: Uuid,
    wiki_id: Option<Uuid>,
    parent_id: Uuid,
) -> Result<(), sqlx::Error> {
    match Wiki::find_by_id(pool, parent_id).await? {
        Some(parent) if parent.workspace_id == workspace_id => {
            if let Some(wiki_id) = wiki_id
                && Wiki::is_ancestor(pool, wiki_id, parent_id).await?
            {
                errors.add("parent_id", "A wiki page cannot be nested under itself.");
            }
        }
        _ => errors.add("parent_id", "The selected parent id is invalid."),
    }
    Ok(())
}

pub async fn create_wiki(
    pool: &SqlitePool,
    workspace_id: Uuid,
    data: &CreateWiki,
    author_id: Uuid,
) -> Result<WikiUpdate, WikiError> {
    let mut errors = ValidationErrors::new();
    validate_title(&mut errors, &data.title);
    validate_summary(&mut errors, data.summary.as_deref());
    if let Some(parent_id) = data.parent_id {
        check_parent(pool, &mut errors, workspace_id, None, parent_id).await?;
    }
    if let Some(project_id) = data.project_id {
        let in_workspace = Project::find_by_id(pool, project_id)
            .await?
            .is_some_and(|p| p.workspace_id == workspace_id);
        if !in_workspace {
            errors.add("project_id", "The selected project id is invalid.");
        }
    }
    errors.into_result()?;

    let mut tx = pool.begin().await?;
    let wiki = Wiki::create(&mut tx, workspace_id, data, author_id).await?;
    let revision = WikiRevision::snapshot(
        &mut tx,
        &wiki,
        Some(data.summary.as_deref().unwrap_or(INITIAL_SUMMARY)),
        Some(author_id),
    )
    .await?;
    tx.commit().await?;

    let wiki = Wiki::find_by_id(pool, wiki.id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    info!(wiki_id = %wiki.id, workspace_id = %workspace_id, "Wiki page created");
    webhooks::emit(pool, workspace_id, WebhookEvent::WikiCreated, &wiki).await;

    Ok(WikiUpdate {
        wiki,
        revision: Some(revision),
    })
}

/// Apply an edit. Title/content changes produce a new revision; a pure
/// no-op produces none.
pub async fn update_wiki(
    pool: &SqlitePool,
    wiki: &Wiki,
    data: &UpdateWiki,
    author_id: Uuid,
) -> Result<WikiUpdate, WikiError> {
    let mut errors = ValidationErrors::new();
    if let Some(title) = &data.title {
        validate_title(&mut errors, title);
    }
    validate_summary(&mut errors, data.summary.as_deref());
    if let Some(&parent_id) = nullable::value(&data.parent_id)
        && Some(parent_id) != wiki.parent_id
    {
        check_parent(pool, &mut errors, wiki.workspace_id, Some(wiki.id), parent_id).await?;
    }
    errors.into_result()?;

    let title = data.title.as_deref().unwrap_or(&wiki.title);
    let content = data.content.as_deref().unwrap_or(&wiki.content);
    let parent_id = nullable::apply(&data.parent_id, &wiki.parent_id).copied();

    let content_changed = title != wiki.title || content != wiki.content;
    if !content_changed && parent_id == wiki.parent_id {
        return Ok(WikiUpdate {
            wiki: wiki.clone(),
            revision: None,
        });
    }

    let mut tx = pool.begin().await?;
    let updated = Wiki::update_content(&mut tx, wiki.id, title, content, parent_id, author_id).await?;
    let revision = if content_changed {
        Some(WikiRevision::snapshot(&mut tx, &updated, data.summary.as_deref(), Some(author_id)).await?)
    } else {
        None
    };
    tx.commit().await?;

    let updated = Wiki::find_by_id(pool, wiki.id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    webhooks::emit(pool, updated.workspace_id, WebhookEvent::WikiUpdated, &updated).await;

    Ok(WikiUpdate {
        wiki: updated,
        revision,
    })
}

/// Copy revision `number` back onto the page as a new revision.
pub async fn restore_revision(
    pool: &SqlitePool,
    wiki: &Wiki,
    number: i64,
    author_id: Uuid,
) -> Result<WikiUpdate, WikiError> {
    let source = WikiRevision::find_by_number(pool, wiki.id, number)
        .await?
        .ok_or(WikiError::RevisionNotFound(number))?;

    let summary = format!("Restored from revision {number}");
    let mut tx = pool.begin().await?;
    let restored = Wiki::update_content(
        &mut tx,
        wiki.id,
        &source.title,
        &source.content,
        wiki.parent_id,
        author_id,
    )
    .await?;
    let revision = WikiRevision::snapshot(&mut tx, &restored, Some(&summary), Some(author_id)).await?;
    tx.commit().await?;

    let restored = Wiki::find_by_id(pool, wiki.id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    info!(wiki_id = %wiki.id, from_revision = number, "Wiki page restored");
    webhooks::emit(pool, restored.workspace_id, WebhookEvent::WikiUpdated, &restored).await;

    Ok(WikiUpdate {
        wiki: restored,
        revision: Some(revision),
    })
}

/// Line diff of revision `from` against revision `to`.
pub async fn diff_revisions(
    pool: &SqlitePool,
    wiki: &Wiki,
    from: i64,
    to: i64,
) -> Result<WikiDiff, WikiError> {
    let old = WikiRevision::find_by_number(pool, wiki.id, from)
        .await?
        .ok_or(WikiError::RevisionNotFound(from))?;
    let new = WikiRevision::find_by_number(pool, wiki.id, to)
        .await?
        .ok_or(WikiError::RevisionNotFound(to))?;

    Ok(WikiDiff {
        wiki_id: wiki.id,
        from,
        to,
        diff: diff_lines(
            &old.content,
            &new.content,
            &format!("revision {from}"),
            &format!("revision {to}"),
        ),
    })
}

/// Keep only the newest `keep` revisions of every page.
pub async fn cleanup_revisions(
    pool: &SqlitePool,
    keep: i64,
    dry_run: bool,
) -> Result<CleanupReport, WikiError> {
    if keep < 1 {
        return Err(ValidationErrors::single("keep", "The keep option must be at least 1.").into());
    }

    let mut report = CleanupReport {
        keep,
        dry_run,
        ..Default::default()
    };
    for candidate in WikiRevision::wikis_exceeding(pool, keep).await? {
        let removed = if dry_run {
            candidate.revisions - keep
        } else {
            WikiRevision::prune(pool, candidate.wiki_id, keep).await? as i64
        };
        report.total_removed += removed;
        report.wikis.push(PrunedWiki {
            wiki_id: candidate.wiki_id,
            stored: candidate.revisions,
            removed,
        });
    }

    info!(
        keep,
        dry_run,
        wikis = report.wikis.len(),
        removed = report.total_removed,
        "Wiki revision cleanup finished"
    );
    Ok(report)
}
