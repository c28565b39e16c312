//! Background service that prunes old wiki revisions.
//!
//! Only runs when `wiki.revision_retention` is configured. Each pass keeps the
//! newest `keep` revisions of every page and deletes the rest.

use sqlx::SqlitePool;
use std::time::Duration;
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info};

use super::{config::WikiConfig, wiki};

#[derive(Debug, Clone)]
pub struct WikiCleanupConfig {
    /// How often to run the cleanup (default: 1 hour)
    pub cleanup_interval: Duration,
    /// Revisions kept per page
    pub keep: i64,
}

impl Default for WikiCleanupConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(60 * 60),
            keep: 50,
        }
    }
}

impl WikiCleanupConfig {
    /// `None` when retention is not configured.
    pub fn from_wiki_config(config: &WikiConfig) -> Option<Self> {
        config.revision_retention.map(|keep| Self {
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
            keep: i64::from(keep.max(1)),
        })
    }
}

pub fn spawn_wiki_cleanup_service(pool: SqlitePool, config: WikiCleanupConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(config.cleanup_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            match wiki::cleanup_revisions(&pool, config.keep, false).await {
                Ok(report) if report.total_removed > 0 => {
                    info!(
                        removed = report.total_removed,
                        wikis = report.wikis.len(),
                        keep = config.keep,
                        "Pruned wiki revisions"
                    );
                }
                Ok(_) => debug!("No wiki revisions to prune"),
                Err(e) => error!(error = ?e, "Failed to prune wiki revisions"),
            }
        }
    })
}
