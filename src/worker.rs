use crate::config::FetchConfig;
use crate::error::{FetchFailure, SessionError};
use crate::session::{Session, SessionOptions, SessionResponse};
use rand::Rng;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
}

/// One logical GET against the target site.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub params: Vec<(String, String)>,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: Url, config: &FetchConfig) -> Self {
        Self {
            url,
            params: Vec::new(),
            max_attempts: config.max_attempts,
            timeout: config.request_timeout,
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }
}

/// Classification of a response. `fetch` only ever returns `Success` or
/// `Failed`; the block and rate-limit variants describe individual attempts
/// and are retried inside the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success { status: u16, body: String },
    Blocked { status: u16 },
    RateLimited { status: u16 },
    Failed(FetchFailure),
}

impl FetchOutcome {
    pub fn classify(response: SessionResponse) -> Self {
        match response.status {
            200 => FetchOutcome::Success {
                status: response.status,
                body: response.body,
            },
            429 => FetchOutcome::RateLimited { status: 429 },
            403 => FetchOutcome::Blocked { status: 403 },
            other => FetchOutcome::Failed(FetchFailure::UpstreamStatus(other)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    pub fn into_body(self) -> Option<String> {
        match self {
            FetchOutcome::Success { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<String, FetchFailure> {
        match self {
            FetchOutcome::Success { body, .. } => Ok(body),
            FetchOutcome::Blocked { status } => Err(FetchFailure::Blocked { status }),
            FetchOutcome::RateLimited { status } => Err(FetchFailure::RateLimited { status }),
            FetchOutcome::Failed(failure) => Err(failure),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub requests_made: u64,
    pub consecutive_failures: u32,
    pub sessions_rotated: u64,
    pub backoff_sleeps: u64,
}

/// A stateful fetcher that owns one session and services one request at a
/// time.
pub struct FetchWorker {
    id: usize,
    session: Option<Session>,
    session_options: SessionOptions,
    config: FetchConfig,
    state: WorkerState,
    stats: WorkerStats,
    last_request_at: Option<Instant>,
}

impl FetchWorker {
    pub fn new(id: usize, config: FetchConfig, session_options: SessionOptions) -> Result<Self, SessionError> {
        let session = Session::new(&session_options)?;
        Ok(Self {
            id,
            session: Some(session),
            session_options,
            config,
            state: WorkerState::Idle,
            stats: WorkerStats::default(),
            last_request_at: None,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub(crate) fn mark_idle(&mut self) {
        self.state = WorkerState::Idle;
    }

    /// Releases the session and its connections. Returns false if the worker
    /// had no session to release.
    pub fn close(&mut self) -> bool {
        self.session.take().is_some()
    }

    /// Convenience wrapper returning the body of a successful fetch.
    pub async fn fetch_text(&mut self, url: Url, params: Vec<(String, String)>) -> Option<String> {
        let request = FetchRequest::new(url, &self.config).with_params(params);
        self.fetch(&request).await.into_body()
    }

    /// Executes a request with pacing, retry and backoff. Never panics on
    /// network faults; every failure is reported as `FetchOutcome::Failed`.
    pub async fn fetch(&mut self, request: &FetchRequest) -> FetchOutcome {
        self.state = WorkerState::Busy;
        self.pace().await;

        let outcome = self.run_attempts(request).await;
        if let FetchOutcome::Failed(failure) = &outcome {
            self.stats.consecutive_failures += 1;
            warn!(
                worker = self.id,
                consecutive_failures = self.stats.consecutive_failures,
                "Request to {} failed: {}",
                request.url,
                failure
            );
        }

        self.state = WorkerState::Idle;
        outcome
    }

    async fn run_attempts(&mut self, request: &FetchRequest) -> FetchOutcome {
        let max_attempts = request.max_attempts.max(1);
        let mut last_failure = FetchFailure::Transport("no attempt was made".to_string());

        for attempt in 1..=max_attempts {
            let session = match self.ensure_session() {
                Ok(session) => session,
                Err(e) => return FetchOutcome::Failed(FetchFailure::Session(e.to_string())),
            };

            let response = match session.get(&request.url, &request.params, request.timeout).await {
                Ok(response) => response,
                Err(e) => {
                    error!(worker = self.id, attempt, max_attempts, "Request failed - {}", e);
                    last_failure = FetchFailure::Transport(e.to_string());
                    if attempt < max_attempts {
                        self.backoff(attempt).await;
                    }
                    continue;
                }
            };

            match FetchOutcome::classify(response) {
                FetchOutcome::Success { status, body } => {
                    self.stats.requests_made += 1;
                    self.stats.consecutive_failures = 0;
                    self.last_request_at = Some(Instant::now());
                    debug!(worker = self.id, attempt, "Fetched {} ({} bytes)", request.url, body.len());
                    return FetchOutcome::Success { status, body };
                }
                FetchOutcome::RateLimited { status } => {
                    warn!(worker = self.id, attempt, max_attempts, "Rate limited");
                    last_failure = FetchFailure::RateLimited { status };
                }
                FetchOutcome::Blocked { status } => {
                    warn!(worker = self.id, attempt, max_attempts, "Block detected, rotating session");
                    self.rotate_session();
                    last_failure = FetchFailure::Blocked { status };
                }
                FetchOutcome::Failed(failure) => {
                    error!(worker = self.id, attempt, "{}", failure);
                    return FetchOutcome::Failed(failure);
                }
            }

            if attempt < max_attempts {
                self.backoff(attempt).await;
            }
        }

        FetchOutcome::Failed(last_failure)
    }

    fn ensure_session(&mut self) -> Result<&mut Session, SessionError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                debug!(worker = self.id, "Creating session on first use");
                Session::new(&self.session_options)?
            }
        };
        Ok(self.session.insert(session))
    }

    fn rotate_session(&mut self) {
        match Session::new(&self.session_options) {
            Ok(session) => {
                info!(worker = self.id, "New session with user agent: {}", session.user_agent());
                self.session = Some(session);
                self.stats.sessions_rotated += 1;
            }
            Err(e) => {
                error!(worker = self.id, "Could not recreate session: {}", e);
                self.session = None;
            }
        }
    }

    async fn backoff(&mut self, attempt: u32) {
        let delay = self.config.retry_delay.saturating_mul(attempt);
        self.stats.backoff_sleeps += 1;
        debug!(worker = self.id, attempt, "Backing off for {:?}", delay);
        sleep(delay).await;
    }

    async fn pace(&self) {
        let Some(last) = self.last_request_at else {
            return;
        };
        if last.elapsed() >= self.config.delay_min {
            return;
        }
        let delay = random_delay(self.config.delay_min, self.config.delay_max);
        debug!(worker = self.id, "Pacing for {:?}", delay);
        sleep(delay).await;
    }
}

impl std::fmt::Debug for FetchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchWorker")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .field("session", &self.session)
            .finish()
    }
}

fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}
