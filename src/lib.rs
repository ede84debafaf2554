pub mod cache;
pub mod config;
pub mod error;
pub mod estimate;
pub mod extract;
pub mod pool;
pub mod research;
pub mod server;
pub mod session;
pub mod types;
pub mod worker;

use std::sync::Arc;
use tracing::info;

pub use config::Config;
pub use error::{FetchFailure, ResearchError};
pub use research::Researcher;
pub use types::*;

use cache::ResultCache;
use estimate::{Estimator, RandomEstimator};
use pool::WorkerPool;
use session::ChallengeSolver;

pub struct AppState {
    pub config: Config,
    pub researcher: Researcher,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Self::with_parts(config, None, Arc::new(RandomEstimator))
    }

    /// Builds the state with an explicit challenge solver and estimator.
    pub fn with_parts(
        config: Config,
        solver: Option<Arc<dyn ChallengeSolver>>,
        estimator: Arc<dyn Estimator>,
    ) -> anyhow::Result<Self> {
        let pool = Arc::new(WorkerPool::new(&config, solver)?);
        let cache = if config.cache.enabled {
            ResultCache::in_memory(config.cache.max_capacity, config.cache.ttl)
        } else {
            ResultCache::disabled()
        };
        let researcher = Researcher::new(pool, cache, config.target_base_url.clone(), estimator)?;
        Ok(Self { config, researcher })
    }

    pub fn pool(&self) -> &WorkerPool {
        self.researcher.pool()
    }

    pub async fn shutdown(&self) -> pool::ShutdownReport {
        info!("Shutting down worker pool");
        self.pool().shutdown().await
    }
}
