use crate::cache::{CacheKey, ResultCache};
use crate::error::{FetchFailure, ResearchError};
use crate::estimate::Estimator;
use crate::extract::filter::MIN_EXTRACTED_TERMS;
use crate::extract::{with_fallback, ListingExtractor, TermExtractor};
use crate::pool::WorkerPool;
use crate::types::{FilterMode, ProductRecord, SearchQuery};
use crate::worker::FetchRequest;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Composes cache, worker pool, fetch and extraction for each query.
pub struct Researcher {
    pool: Arc<WorkerPool>,
    cache: ResultCache,
    search_url: Url,
    trending_url: Url,
    listings: ListingExtractor,
    terms: TermExtractor,
}

impl Researcher {
    pub fn new(
        pool: Arc<WorkerPool>,
        cache: ResultCache,
        base_url: Url,
        estimator: Arc<dyn Estimator>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            pool,
            cache,
            search_url: base_url.join("/search")?,
            trending_url: base_url.join("/trending")?,
            listings: ListingExtractor::new(base_url.clone(), estimator),
            terms: TermExtractor::new(base_url),
        })
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Search URL with deterministic parameter order.
    pub fn build_search_url(&self, query: &SearchQuery) -> Url {
        let mut url = self.search_url.clone();
        let q = format!("{} {}", query.keyword.trim(), query.product_type.trim());
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", q.trim())
                .append_pair("explicit", "1")
                .append_pair("ref", "search_bar");
            match query.filter_mode {
                FilterMode::StarSeller => {
                    pairs.append_pair("is_star_seller", "true");
                }
                FilterMode::BestSeller => {
                    pairs.append_pair("is_best_seller", "true");
                }
                FilterMode::All => {}
            }
        }
        url
    }

    /// Product records for a search, ranked by popularity estimate and
    /// truncated to `max_results`.
    ///
    /// An empty list means the page had no listings; fetch problems and a
    /// saturated pool are reported as errors instead.
    pub async fn search_products(&self, query: &SearchQuery) -> Result<Vec<ProductRecord>, ResearchError> {
        let keyword = query.keyword.trim();
        if keyword.is_empty() {
            return Err(ResearchError::InvalidQuery("keyword must not be empty".to_string()));
        }

        let key = CacheKey::search(query);
        if let Some(records) = self.cache.get_json::<Vec<ProductRecord>>(&key).await {
            info!("Cache hit for {}", key);
            return Ok(truncated(records, query.max_results));
        }

        let mut worker = self.pool.acquire().ok_or(ResearchError::CapacityExhausted)?;
        let url = self.build_search_url(query);
        info!("Bot {} searching: {}", worker.id(), url);

        let request = FetchRequest::new(url, worker.config());
        let html = worker.fetch(&request).await.into_result()?;
        drop(worker);
        if html.trim().is_empty() {
            return Err(FetchFailure::EmptyBody.into());
        }

        let extraction = self.listings.extract(&html, keyword);
        if let Some(selector) = extraction.container_selector {
            debug!("Listings matched container selector {}", selector);
        }
        let records = extraction.records;

        if !records.is_empty() {
            self.cache.set_json(&key, &records).await;
        }
        Ok(truncated(records, query.max_results))
    }

    /// Trending terms, never failing: when nothing can be fetched or too
    /// little survives filtering, the default list fills the gap.
    pub async fn trending_terms(&self, limit: usize) -> Vec<String> {
        let key = CacheKey::trending();
        if let Some(terms) = self.cache.get_json::<Vec<String>>(&key).await {
            info!("Cache hit for {}", key);
            return with_fallback(terms, limit);
        }

        let Some(mut worker) = self.pool.acquire() else {
            warn!("No available bots, serving default trending keywords");
            return with_fallback(Vec::new(), limit);
        };

        let request = FetchRequest::new(self.trending_url.clone(), worker.config());
        let Some(html) = worker.fetch(&request).await.into_body() else {
            warn!("Trending page fetch failed, serving default trending keywords");
            return with_fallback(Vec::new(), limit);
        };
        drop(worker);

        let terms = self.terms.extract(&html);
        if terms.len() < MIN_EXTRACTED_TERMS {
            warn!("Not enough real keywords found ({}), mixing with defaults", terms.len());
        }
        if !terms.is_empty() {
            self.cache.set_json(&key, &terms).await;
        }
        with_fallback(terms, limit)
    }
}

fn truncated<T>(mut items: Vec<T>, max: usize) -> Vec<T> {
    items.truncate(max);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::estimate::RandomEstimator;
    use crate::extract::DEFAULT_TERMS;

    fn researcher(base: &str) -> Researcher {
        let config = Config {
            pool_size: 1,
            ..Config::default()
        };
        let pool = Arc::new(WorkerPool::new(&config, None).unwrap());
        Researcher::new(
            pool,
            ResultCache::disabled(),
            Url::parse(base).unwrap(),
            Arc::new(RandomEstimator),
        )
        .unwrap()
    }

    #[test]
    fn test_search_url_encoding() {
        let researcher = researcher("https://www.etsy.com");
        let url = researcher.build_search_url(&SearchQuery::new("frog", "mug"));
        assert_eq!(
            url.as_str(),
            "https://www.etsy.com/search?q=frog+mug&explicit=1&ref=search_bar&is_star_seller=true"
        );

        let url = researcher.build_search_url(&SearchQuery::new("linen & co", "").with_filter(FilterMode::BestSeller));
        assert_eq!(
            url.as_str(),
            "https://www.etsy.com/search?q=linen+%26+co&explicit=1&ref=search_bar&is_best_seller=true"
        );

        let url = researcher.build_search_url(&SearchQuery::new("frog", "mug").with_filter(FilterMode::All));
        assert!(!url.as_str().contains("is_"));
    }

    #[tokio::test]
    async fn test_blank_keyword_is_rejected() {
        let researcher = researcher("https://www.etsy.com");
        let result = researcher.search_products(&SearchQuery::new("   ", "mug")).await;
        assert!(matches!(result, Err(ResearchError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_capacity_exhausted_when_pool_is_busy() {
        let researcher = researcher("https://www.etsy.com");
        let _held = researcher.pool().acquire().unwrap();
        let result = researcher.search_products(&SearchQuery::new("frog", "mug")).await;
        assert!(matches!(result, Err(ResearchError::CapacityExhausted)));

        let terms = researcher.trending_terms(5).await;
        let expected: Vec<String> = DEFAULT_TERMS.iter().take(5).map(|t| t.to_string()).collect();
        assert_eq!(terms, expected);
    }
}
