use crate::error::SessionError;
use futures::future::BoxFuture;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION, COOKIE, USER_AGENT};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// User agents for rotation
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
];

/// Markers found in interstitial bot-challenge pages.
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-chl",
    "challenge-platform",
    "cf_chl_opt",
    "Just a moment...",
    "Checking your browser",
];

/// A challenge page handed to a [`ChallengeSolver`].
#[derive(Debug, Clone, Copy)]
pub struct Challenge<'a> {
    pub url: &'a Url,
    pub status: u16,
    pub body: &'a str,
    pub user_agent: &'a str,
}

/// Credentials that let a session through a solved challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clearance {
    /// Value for the `Cookie` header, e.g. `cf_clearance=...`.
    pub cookie: String,
    /// Some solvers bind the clearance to the user agent they used.
    pub user_agent: Option<String>,
}

/// External anti-bot challenge solver. Implementations are black boxes to
/// this crate; returning `None` means the challenge could not be solved.
pub trait ChallengeSolver: Send + Sync {
    fn solve<'a>(&'a self, challenge: Challenge<'a>) -> BoxFuture<'a, Option<Clearance>>;
}

/// Returns true when a response looks like a bot-challenge interstitial
/// rather than real content.
pub fn is_challenge(status: u16, body: &str) -> bool {
    (status == 403 || status == 503) && CHALLENGE_MARKERS.iter().any(|m| body.contains(m))
}

#[derive(Clone, Default)]
pub struct SessionOptions {
    pub proxy: Option<String>,
    pub solver: Option<Arc<dyn ChallengeSolver>>,
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("proxy", &self.proxy)
            .field("solver", &self.solver.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionResponse {
    pub status: u16,
    pub body: String,
}

/// Browser-like HTTP session owned by one fetch worker. Each session has its
/// own `reqwest::Client`, cookie jar and connection pool; building one opens
/// no connections.
pub struct Session {
    client: Client,
    user_agent: String,
    solver: Option<Arc<dyn ChallengeSolver>>,
    clearance: Option<Clearance>,
}

impl Session {
    pub fn new(options: &SessionOptions) -> Result<Self, SessionError> {
        let user_agent = random_user_agent().to_string();

        // Accept-Encoding is negotiated by reqwest's gzip/brotli/deflate features.
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        headers.insert("DNT", HeaderValue::from_static("1"));

        let mut builder = Client::builder()
            .default_headers(headers)
            .user_agent(user_agent.clone())
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(endpoint) = options.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(endpoint).map_err(|source| SessionError::Proxy {
                endpoint: endpoint.to_string(),
                source,
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;
        debug!("Created session with user agent: {}", user_agent);

        Ok(Self {
            client,
            user_agent,
            solver: options.solver.clone(),
            clearance: None,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn has_clearance(&self) -> bool {
        self.clearance.is_some()
    }

    /// Issues a GET request. A challenge page is handed to the installed
    /// solver and, if solved, the request is re-issued once with the
    /// clearance, which the session keeps for later requests.
    pub async fn get(
        &mut self,
        url: &Url,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<SessionResponse, reqwest::Error> {
        let response = self.send(url, params, timeout).await?;

        let Some(solver) = self.solver.clone() else {
            return Ok(response);
        };
        if !is_challenge(response.status, &response.body) {
            return Ok(response);
        }

        info!("Challenge page detected at {}, consulting solver", url);
        let challenge = Challenge {
            url,
            status: response.status,
            body: &response.body,
            user_agent: &self.user_agent,
        };
        let solved = solver.solve(challenge).await;
        match solved {
            Some(clearance) => {
                self.clearance = Some(clearance);
                self.send(url, params, timeout).await
            }
            None => {
                warn!("Challenge solver gave up on {}", url);
                Ok(response)
            }
        }
    }

    async fn send(
        &self,
        url: &Url,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<SessionResponse, reqwest::Error> {
        let mut request = self.client.get(url.clone()).timeout(timeout);
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(clearance) = &self.clearance {
            request = request.header(COOKIE, clearance.cookie.as_str());
            if let Some(ua) = &clearance.user_agent {
                request = request.header(USER_AGENT, ua.as_str());
            }
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(SessionResponse { status, body })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_agent", &self.user_agent)
            .field("solver", &self.solver.is_some())
            .field("clearance", &self.clearance.is_some())
            .finish()
    }
}

fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_detection() {
        assert!(is_challenge(403, "<html><title>Just a moment...</title></html>"));
        assert!(is_challenge(503, "<script src=\"/cdn-cgi/challenge-platform/h/b\"></script>"));
        assert!(!is_challenge(403, "<html>Forbidden</html>"));
        assert!(!is_challenge(200, "<html>Just a moment...</html>"));
    }

    #[test]
    fn test_user_agent_comes_from_rotation_list() {
        let session = Session::new(&SessionOptions::default()).unwrap();
        assert!(USER_AGENTS.contains(&session.user_agent()));
        assert!(!session.has_clearance());
    }

    #[test]
    fn test_invalid_proxy_is_rejected() {
        let options = SessionOptions {
            proxy: Some("not a proxy url".to_string()),
            solver: None,
        };
        assert!(matches!(Session::new(&options), Err(SessionError::Proxy { .. })));
    }
}
