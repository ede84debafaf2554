use crate::types::Estimates;
use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;

static SIGNAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d+)\s*review",
        r"(\d+)\s*sale",
        r"sold\s*(\d+)",
        r"(\d+)\s*favorite",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Pulls a count such as `1,234 sales` or `sold 12` out of caption text.
pub fn popularity_signal(text: &str) -> Option<u32> {
    let normalized = text.to_lowercase().replace(',', "");
    SIGNAL_PATTERNS
        .iter()
        .find_map(|re| re.captures(&normalized))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Sampled stand-ins for listing signals the page does not expose.
pub trait Estimator: Send + Sync {
    /// Popularity given an optional scraped count hint.
    fn popularity(&self, signal: Option<u32>) -> u32;
    fn views(&self) -> u32;
    fn listing_age_days(&self) -> u32;
    fn shop_rating(&self) -> f32;

    fn estimate(&self, signal: Option<u32>) -> Estimates {
        Estimates {
            sales_count: self.popularity(signal),
            views: self.views(),
            listing_age_days: self.listing_age_days(),
            shop_rating: self.shop_rating(),
        }
    }
}

/// Uniform sampling within fixed bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomEstimator;

impl Estimator for RandomEstimator {
    fn popularity(&self, signal: Option<u32>) -> u32 {
        let mut rng = rand::thread_rng();
        match signal {
            Some(n) => {
                let low = n.saturating_mul(2);
                rng.gen_range(low..=n.saturating_mul(5))
            }
            None => rng.gen_range(10..=500),
        }
    }

    fn views(&self) -> u32 {
        rand::thread_rng().gen_range(500..=5000)
    }

    fn listing_age_days(&self) -> u32 {
        rand::thread_rng().gen_range(30..=365)
    }

    fn shop_rating(&self) -> f32 {
        let rating: f32 = rand::thread_rng().gen_range(4.0..=5.0);
        (rating * 10.0).round() / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popularity_signal_patterns() {
        assert_eq!(popularity_signal("1,234 sales"), Some(1234));
        assert_eq!(popularity_signal("Sold 12 times"), Some(12));
        assert_eq!(popularity_signal("(85 reviews)"), Some(85));
        assert_eq!(popularity_signal("40 favorites"), Some(40));
        assert_eq!(popularity_signal("Ships from Ohio"), None);
    }

    #[test]
    fn test_random_estimates_stay_in_bounds() {
        let estimator = RandomEstimator;
        for _ in 0..200 {
            let e = estimator.estimate(Some(10));
            assert!((20..=50).contains(&e.sales_count));
            assert!((500..=5000).contains(&e.views));
            assert!((30..=365).contains(&e.listing_age_days));
            assert!((4.0..=5.0).contains(&e.shop_rating));
            assert!((10..=500).contains(&estimator.popularity(None)));
        }
        assert_eq!(estimator.popularity(Some(0)), 0);
    }
}
