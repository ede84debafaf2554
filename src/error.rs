use thiserror::Error;

/// Terminal cause of a fetch that did not end in a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("blocked by target site (HTTP {status})")]
    Blocked { status: u16 },
    #[error("rate limited by target site (HTTP {status})")]
    RateLimited { status: u16 },
    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),
    #[error("upstream returned an empty page")]
    EmptyBody,
    #[error("could not create session: {0}")]
    Session(String),
}

/// Failures surfaced to callers of the query orchestrator.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Every worker is busy; the caller should try again later.
    #[error("no available bots")]
    CapacityExhausted,
    #[error("failed to fetch search results: {0}")]
    UpstreamUnavailable(#[from] FetchFailure),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid proxy endpoint '{endpoint}': {source}")]
    Proxy {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
