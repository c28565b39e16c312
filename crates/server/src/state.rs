use std::sync::Arc;

use db::DBService;
use services::services::config::Config;
use sqlx::SqlitePool;
use utils::pagination::{Page, PageParams};

#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: DBService, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db.pool
    }

    /// Clamp `?page=&per_page=` to the configured bounds.
    pub fn page(&self, params: &PageParams) -> Page {
        params.resolve(
            self.config.pagination.default_per_page,
            self.config.pagination.max_per_page,
        )
    }
}
