use serde::{Deserialize, Serialize};

use crate::pool::PoolStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    StarSeller,
    BestSeller,
    All,
}

impl FilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMode::StarSeller => "star_seller",
            FilterMode::BestSeller => "best_seller",
            FilterMode::All => "all",
        }
    }
}

fn default_max_results() -> usize {
    20
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(rename = "filter_type", default)]
    pub filter_mode: FilterMode,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl SearchQuery {
    pub fn new(keyword: impl Into<String>, product_type: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            product_type: product_type.into(),
            filter_mode: FilterMode::default(),
            max_results: default_max_results(),
        }
    }

    pub fn with_filter(mut self, filter_mode: FilterMode) -> Self {
        self.filter_mode = filter_mode;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Values that are sampled rather than scraped. They approximate signals
/// the listing page does not expose and must not be read as measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimates {
    /// Popularity estimate used for ranking.
    pub sales_count: u32,
    pub views: u32,
    /// Recency estimate.
    pub listing_age_days: u32,
    pub shop_rating: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub title: String,
    pub price: String,
    pub shop_name: String,
    pub url: String,
    pub image_url: String,
    pub is_star_seller: bool,
    pub is_best_seller: bool,
    pub keywords: Vec<String>,
    pub estimated: Estimates,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrendingParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrendingResponse {
    pub trending: Vec<String>,
    pub updated: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub bots_status: PoolStatus,
    pub cache_enabled: bool,
    pub proxy_endpoints: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
