use crate::config::Config;
use crate::error::SessionError;
use crate::session::{ChallengeSolver, SessionOptions};
use crate::worker::FetchWorker;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub available: usize,
    pub busy: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub released: usize,
    pub skipped: usize,
}

/// Exclusive claim on one worker. The worker goes back to the pool when the
/// lease is dropped.
pub struct WorkerLease {
    guard: OwnedMutexGuard<FetchWorker>,
}

impl Deref for WorkerLease {
    type Target = FetchWorker;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for WorkerLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        // A fetch future dropped mid-flight never reached its own reset.
        self.guard.mark_idle();
    }
}

/// Fixed-size set of fetch workers. There is no queue: when every worker is
/// leased, `acquire` returns `None` immediately.
pub struct WorkerPool {
    workers: Vec<Arc<Mutex<FetchWorker>>>,
    closed: AtomicBool,
    shutdown_grace: Duration,
}

impl WorkerPool {
    pub fn new(config: &Config, solver: Option<Arc<dyn ChallengeSolver>>) -> Result<Self, SessionError> {
        let mut workers = Vec::with_capacity(config.pool_size);
        for id in 0..config.pool_size {
            let options = SessionOptions {
                proxy: config.proxy_for(id).map(str::to_string),
                solver: solver.clone(),
            };
            workers.push(FetchWorker::new(id, config.fetch.clone(), options)?);
        }
        info!(
            "Initialized {} bots with {} proxies",
            workers.len(),
            config.proxy_endpoints.len()
        );
        Ok(Self::from_workers(workers))
    }

    pub fn from_workers(workers: Vec<FetchWorker>) -> Self {
        Self {
            workers: workers.into_iter().map(|w| Arc::new(Mutex::new(w))).collect(),
            closed: AtomicBool::new(false),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Claims the first idle worker, scanning in order.
    pub fn acquire(&self) -> Option<WorkerLease> {
        if self.is_closed() {
            return None;
        }
        let lease = self
            .workers
            .iter()
            .find_map(|worker| worker.clone().try_lock_owned().ok())
            .map(|guard| WorkerLease { guard });
        match &lease {
            Some(lease) => debug!("Acquired bot {}", lease.id()),
            None => debug!("No idle bot among {}", self.workers.len()),
        }
        lease
    }

    pub fn status(&self) -> PoolStatus {
        let busy = self.workers.iter().filter(|w| w.try_lock().is_err()).count();
        PoolStatus {
            total: self.workers.len(),
            available: self.workers.len() - busy,
            busy,
        }
    }

    /// Releases every worker's session. Only the first call does any work;
    /// a worker that stays busy past the grace period is skipped so the
    /// remaining workers are still released.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Worker pool already shut down");
            return ShutdownReport::default();
        }

        let mut report = ShutdownReport::default();
        for (index, worker) in self.workers.iter().enumerate() {
            match tokio::time::timeout(self.shutdown_grace, worker.clone().lock_owned()).await {
                Ok(mut guard) => {
                    guard.close();
                    report.released += 1;
                }
                Err(_) => {
                    warn!("Bot {} still busy after {:?}, skipping release", index, self.shutdown_grace);
                    report.skipped += 1;
                }
            }
        }
        info!(
            "Worker pool shut down: {} released, {} skipped",
            report.released, report.skipped
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::worker::WorkerState;

    fn pool(size: usize) -> WorkerPool {
        let workers = (0..size)
            .map(|id| FetchWorker::new(id, FetchConfig::default(), SessionOptions::default()).unwrap())
            .collect();
        WorkerPool::from_workers(workers)
    }

    #[tokio::test]
    async fn test_acquire_returns_none_when_all_busy() {
        let pool = pool(2);
        let first = pool.acquire().expect("first worker");
        let second = pool.acquire().expect("second worker");
        assert_ne!(first.id(), second.id());
        assert!(pool.acquire().is_none());
        assert_eq!(
            pool.status(),
            PoolStatus {
                total: 2,
                available: 0,
                busy: 2
            }
        );
    }

    #[tokio::test]
    async fn test_acquire_scans_in_order_and_reuses_released_worker() {
        let pool = pool(3);
        let first = pool.acquire().unwrap();
        assert_eq!(first.id(), 0);
        let second = pool.acquire().unwrap();
        assert_eq!(second.id(), 1);
        drop(first);
        let again = pool.acquire().unwrap();
        assert_eq!(again.id(), 0);
        assert_eq!(again.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_shutdown_runs_once_and_closes_pool() {
        let pool = pool(2);
        let report = pool.shutdown().await;
        assert_eq!(report, ShutdownReport { released: 2, skipped: 0 });
        assert!(pool.acquire().is_none());
        assert_eq!(pool.shutdown().await, ShutdownReport::default());
    }

    #[tokio::test]
    async fn test_shutdown_skips_worker_that_stays_busy() {
        let pool = pool(2).with_shutdown_grace(Duration::from_millis(20));
        let held = pool.acquire().unwrap();
        let report = pool.shutdown().await;
        assert_eq!(report, ShutdownReport { released: 1, skipped: 1 });
        drop(held);
    }

    #[test]
    fn test_pool_from_config_assigns_proxies() {
        let config = Config {
            pool_size: 3,
            proxy_endpoints: vec!["http://127.0.0.1:3128".to_string()],
            ..Config::default()
        };
        let pool = WorkerPool::new(&config, None).unwrap();
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.status().available, 3);
    }
}
