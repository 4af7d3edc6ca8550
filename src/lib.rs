pub mod activity;
pub mod config;
pub mod error;
pub mod model;
pub mod rewards;
pub mod scoring;
pub mod storage;
pub mod sweeper;
pub mod tasks;

use std::sync::Arc;

use config::HabitdConfig;
use scoring::ScoringEngine;
use storage::Storage;
use tasks::TaskStore;

/// Shared application state passed to CLI handlers and background jobs.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<HabitdConfig>,
    pub storage: Storage,
    pub tasks: TaskStore,
    pub engine: ScoringEngine,
}

impl AppContext {
    pub fn new(config: HabitdConfig, storage: Storage) -> Self {
        let pool = storage.pool();
        Self {
            config: Arc::new(config),
            tasks: TaskStore::new(pool.clone()),
            engine: ScoringEngine::new(pool),
            storage,
        }
    }
}
