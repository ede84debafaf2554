use anyhow::{anyhow, bail, Context, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Settings for a single fetch worker and the sessions it creates.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Pacing floor and ceiling; a request issued sooner than `delay_min`
    /// after the previous one sleeps a random duration in this range.
    pub delay_min: Duration,
    pub delay_max: Duration,
    /// Unit of the linear backoff (`retry_delay * attempt`).
    pub retry_delay: Duration,
    pub max_attempts: u32,
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            delay_min: Duration::from_secs(2),
            delay_max: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
            max_attempts: 3,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
            max_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub target_base_url: Url,
    pub pool_size: usize,
    pub proxy_endpoints: Vec<String>,
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub bind_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_base_url: Url::parse("https://www.etsy.com").expect("static URL is valid"),
            pool_size: 5,
            proxy_endpoints: Vec::new(),
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, applying defaults for
    /// missing keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let target_base_url = match get("TARGET_BASE_URL") {
            Some(raw) => Url::parse(&raw).with_context(|| format!("TARGET_BASE_URL '{}' is not a valid URL", raw))?,
            None => defaults.target_base_url,
        };
        if target_base_url.scheme() != "http" && target_base_url.scheme() != "https" {
            bail!("TARGET_BASE_URL must use HTTP or HTTPS protocol");
        }

        let pool_size = parse_or(&get, "MAX_CONCURRENT_BOTS", defaults.pool_size)?;
        if pool_size == 0 {
            bail!("MAX_CONCURRENT_BOTS must be at least 1");
        }

        let proxy_endpoints = get("CLOUDFLARE_FLOXY_ENDPOINTS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|ep| !ep.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let fetch = FetchConfig {
            delay_min: secs_or(&get, "REQUEST_DELAY_MIN_SECS", defaults.fetch.delay_min)?,
            delay_max: secs_or(&get, "REQUEST_DELAY_MAX_SECS", defaults.fetch.delay_max)?,
            retry_delay: secs_or(&get, "RETRY_DELAY_SECS", defaults.fetch.retry_delay)?,
            max_attempts: parse_or(&get, "MAX_RETRIES", defaults.fetch.max_attempts)?,
            request_timeout: secs_or(&get, "REQUEST_TIMEOUT_SECS", defaults.fetch.request_timeout)?,
        };
        if fetch.delay_min > fetch.delay_max {
            bail!("REQUEST_DELAY_MIN_SECS must not exceed REQUEST_DELAY_MAX_SECS");
        }
        if fetch.max_attempts == 0 {
            bail!("MAX_RETRIES must be at least 1");
        }

        let cache = CacheConfig {
            enabled: parse_or(&get, "CACHE_ENABLED", defaults.cache.enabled)?,
            ttl: secs_or(&get, "CACHE_EXPIRY_SECS", defaults.cache.ttl)?,
            max_capacity: parse_or(&get, "CACHE_MAX_CAPACITY", defaults.cache.max_capacity)?,
        };

        let bind_addr = parse_or(&get, "BIND_ADDR", defaults.bind_addr)?;

        Ok(Self {
            target_base_url,
            pool_size,
            proxy_endpoints,
            fetch,
            cache,
            bind_addr,
        })
    }

    /// Proxy endpoint assigned to worker `worker_id`, round-robin.
    pub fn proxy_for(&self, worker_id: usize) -> Option<&str> {
        if self.proxy_endpoints.is_empty() {
            return None;
        }
        Some(self.proxy_endpoints[worker_id % self.proxy_endpoints.len()].as_str())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

fn secs_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => {
            let secs: f64 = raw
                .parse()
                .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, raw, e))?;
            Duration::try_from_secs_f64(secs).map_err(|e| anyhow!("{} has invalid value '{}': {}", key, raw, e))
        }
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.fetch.retry_delay, Duration::from_secs(5));
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(30));
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert!(config.cache.enabled);
        assert_eq!(config.target_base_url.as_str(), "https://www.etsy.com/");
        assert!(config.proxy_endpoints.is_empty());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("MAX_CONCURRENT_BOTS", "2"),
            ("REQUEST_DELAY_MIN_SECS", "0.5"),
            ("REQUEST_DELAY_MAX_SECS", "1"),
            ("CACHE_ENABLED", "false"),
            ("CLOUDFLARE_FLOXY_ENDPOINTS", "http://a:1, ,http://b:2"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ]))
        .unwrap();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.fetch.delay_min, Duration::from_millis(500));
        assert!(!config.cache.enabled);
        assert_eq!(config.proxy_endpoints, vec!["http://a:1", "http://b:2"]);
        assert_eq!(config.proxy_for(0), Some("http://a:1"));
        assert_eq!(config.proxy_for(3), Some("http://b:2"));
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("MAX_CONCURRENT_BOTS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("MAX_RETRIES", "many")])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("REQUEST_DELAY_MIN_SECS", "6"),
            ("REQUEST_DELAY_MAX_SECS", "5"),
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup(&[("TARGET_BASE_URL", "ftp://example.com")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RETRY_DELAY_SECS", "-1")])).is_err());
    }
}
