use super::terms::TITLE_SELECTORS;
use super::{element_text, SelectorChain};
use crate::estimate::{popularity_signal, Estimator};
use crate::types::ProductRecord;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};
use url::Url;

const CONTAINER_SELECTORS: &[&str] = &[
    "div[data-test-id=\"organic-search-result\"]",
    "div[class*=\"listing-card\"]",
    "div[class*=\"search-result\"]",
    ".organic-search-result",
];

const PRICE_SELECTORS: &[&str] = &[".lc-price", ".wt-text-title-01", ".price", ".currency-value"];

const SHOP_SELECTORS: &[&str] = &[
    "p.wt-text-caption",
    ".wt-text-caption a[href*=\"/shop/\"]",
    ".shop-name",
    "a[href*=\"/shop/\"]",
];

const LINK_SELECTORS: &[&str] = &[
    "a[data-test-id=\"listing-link\"]",
    ".v2-listing-card__title a",
    "a[href*=\"/listing/\"]",
    ".listing-link",
];

const IMAGE_SELECTORS: &[&str] = &[
    "img.v2-listing-card__img",
    "img[data-test-id=\"listing-card-image\"]",
    ".v2-listing-card__img",
    "img",
];

const SALES_SELECTORS: &[&str] = &[
    ".wt-text-caption .wt-text-gray",
    ".wt-text-caption .wt-text-gray-light",
    ".wt-text-caption",
];

const BADGE_SELECTORS: &[&str] = &[".wt-badge", ".wt-text-caption .wt-badge", ".wt-text-caption .wt-text-gray"];

const MARKETING_KEYWORDS: &[&str] = &[
    "gift",
    "custom",
    "personalized",
    "handmade",
    "vintage",
    "unique",
    "funny",
    "cute",
    "cool",
    "trendy",
    "modern",
];

const MAX_RECORD_KEYWORDS: usize = 6;
const MAX_TITLE_WORDS: usize = 3;

const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_SHOP: &str = "Unknown Shop";
const UNKNOWN_PRICE: &str = "$0.00";

static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([$€£])\s*(\d[\d.,]*)").expect("valid price pattern"));

static TITLE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").expect("valid word pattern"));

#[derive(Debug, Clone)]
pub struct ListingExtraction {
    /// Records ranked by descending popularity estimate.
    pub records: Vec<ProductRecord>,
    /// The container selector that matched, if any.
    pub container_selector: Option<&'static str>,
}

pub struct ListingExtractor {
    base_url: Url,
    estimator: Arc<dyn Estimator>,
    containers: SelectorChain,
    title: SelectorChain,
    price: SelectorChain,
    shop: SelectorChain,
    link: SelectorChain,
    image: SelectorChain,
    sales: SelectorChain,
    badges: SelectorChain,
}

impl ListingExtractor {
    pub fn new(base_url: Url, estimator: Arc<dyn Estimator>) -> Self {
        Self {
            base_url,
            estimator,
            containers: SelectorChain::new("container", CONTAINER_SELECTORS),
            title: SelectorChain::new("title", TITLE_SELECTORS),
            price: SelectorChain::new("price", PRICE_SELECTORS),
            shop: SelectorChain::new("shop", SHOP_SELECTORS),
            link: SelectorChain::new("link", LINK_SELECTORS),
            image: SelectorChain::new("image", IMAGE_SELECTORS),
            sales: SelectorChain::new("sales", SALES_SELECTORS),
            badges: SelectorChain::new("badge", BADGE_SELECTORS),
        }
    }

    pub fn extract(&self, html: &str, search_keyword: &str) -> ListingExtraction {
        let document = Html::parse_document(html);
        let Some((selector, containers)) = self.containers.first_in_document(&document) else {
            info!("Found 0 product containers");
            return ListingExtraction {
                records: Vec::new(),
                container_selector: None,
            };
        };
        info!("Found {} product containers with selector: {}", containers.len(), selector);

        let mut records: Vec<ProductRecord> = containers
            .into_iter()
            .map(|container| self.parse_container(container, search_keyword))
            .collect();
        records.sort_by(|a, b| b.estimated.sales_count.cmp(&a.estimated.sales_count));

        ListingExtraction {
            records,
            container_selector: Some(selector),
        }
    }

    fn parse_container(&self, container: ElementRef<'_>, search_keyword: &str) -> ProductRecord {
        let title = self
            .title
            .first_in(container, |el| !element_text(el).is_empty())
            .map(|el| element_text(&el))
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

        let price = self
            .price
            .first_in(container, |el| has_currency(&element_text(el)))
            .map(|el| normalize_price(&element_text(&el)))
            .unwrap_or_else(|| UNKNOWN_PRICE.to_string());

        let shop_name = self
            .shop
            .first_in(container, |el| !element_text(el).is_empty())
            .map(|el| element_text(&el))
            .unwrap_or_else(|| UNKNOWN_SHOP.to_string());

        let url = self
            .link
            .first_in(container, |el| el.value().attr("href").is_some())
            .and_then(|el| el.value().attr("href"))
            .map(|href| self.absolute(href))
            .unwrap_or_default();

        let image_url = self
            .image
            .first_in(container, |el| el.value().attr("src").is_some())
            .and_then(|el| el.value().attr("src"))
            .map(|src| self.absolute(src))
            .unwrap_or_default();

        let signal = self
            .sales
            .first_in(container, |el| {
                let text = element_text(el).to_lowercase();
                text.contains("sale") || text.contains("sold")
            })
            .and_then(|el| popularity_signal(&element_text(&el)));

        let (is_star_seller, is_best_seller) = self.badges(container);

        debug!("Parsed listing '{}' ({})", title, price);
        ProductRecord {
            keywords: record_keywords(&title, search_keyword),
            title,
            price,
            shop_name,
            url,
            image_url,
            is_star_seller,
            is_best_seller,
            estimated: self.estimator.estimate(signal),
        }
    }

    /// Every badge selector is consulted; badges do not stop at the first
    /// match.
    fn badges(&self, container: ElementRef<'_>) -> (bool, bool) {
        let mut star = false;
        let mut best = false;
        for badge in self.badges.each_first(container) {
            let text = element_text(&badge).to_lowercase();
            star |= text.contains("star seller");
            best |= text.contains("best seller") || text.contains("bestseller");
        }
        (star, best)
    }

    fn absolute(&self, href: &str) -> String {
        match self.base_url.join(href) {
            Ok(url) => url.to_string(),
            Err(_) => href.to_string(),
        }
    }
}

fn has_currency(text: &str) -> bool {
    text.contains(['$', '€', '£'])
}

fn normalize_price(text: &str) -> String {
    match PRICE.captures(text) {
        Some(caps) => format!("{}{}", &caps[1], &caps[2]),
        None => text.to_string(),
    }
}

/// Keyword set for one listing: the search keyword, marketing keywords in
/// the title, then leading title words.
pub fn record_keywords(title: &str, search_keyword: &str) -> Vec<String> {
    let mut keywords = vec![search_keyword.trim().to_lowercase()];
    let title_lower = title.to_lowercase();

    for keyword in MARKETING_KEYWORDS {
        if title_lower.contains(keyword) && !keywords.iter().any(|k| k == keyword) {
            keywords.push(keyword.to_string());
        }
    }

    for word in TITLE_WORD.find_iter(&title_lower).take(MAX_TITLE_WORDS) {
        let word = word.as_str();
        if word.len() > 3 && !keywords.iter().any(|k| k == word) {
            keywords.push(word.to_string());
        }
    }

    keywords.truncate(MAX_RECORD_KEYWORDS);
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::RandomEstimator;

    /// Uses the scraped count as the popularity so ranking is deterministic.
    struct SignalEstimator;

    impl Estimator for SignalEstimator {
        fn popularity(&self, signal: Option<u32>) -> u32 {
            signal.unwrap_or(0)
        }
        fn views(&self) -> u32 {
            1000
        }
        fn listing_age_days(&self) -> u32 {
            60
        }
        fn shop_rating(&self) -> f32 {
            4.5
        }
    }

    fn extractor() -> ListingExtractor {
        ListingExtractor::new(Url::parse("https://www.etsy.com").unwrap(), Arc::new(SignalEstimator))
    }

    const THREE_CONTAINERS: &str = r#"
        <html><body>
        <div data-test-id="organic-search-result">
            <a data-test-id="listing-link" href="/listing/1/frog-mug">
                <h3 class="v2-listing-card__title">Frog Mug Handmade Ceramic</h3>
            </a>
            <p class="wt-text-title-01"><span class="currency-symbol">$</span><span class="currency-value">24.00</span></p>
            <p class="wt-text-caption">FrogStudio</p>
            <img class="v2-listing-card__img" src="https://i.etsystatic.com/1.jpg">
            <div class="wt-text-caption"><span class="wt-text-gray">120 sales</span></div>
            <span class="wt-badge">Star Seller</span>
        </div>
        <div data-test-id="organic-search-result">
            <h3 class="v2-listing-card__title">Vintage Linen Apron</h3>
            <a href="/listing/2/apron">view</a>
            <p class="price">€18,50</p>
            <div class="wt-text-caption"><span class="wt-text-gray">Sold 300</span></div>
            <span class="wt-badge">Bestseller</span>
        </div>
        <div data-test-id="organic-search-result">
            <h3>Custom Pet Portrait</h3>
            <p class="price">Price: £40</p>
        </div>
        <div class="listing-card-other"><h3 class="v2-listing-card__title">Not Counted</h3></div>
        </body></html>
    "#;

    #[test]
    fn test_three_containers_all_titled_by_first_matching_selector() {
        let extraction = extractor().extract(THREE_CONTAINERS, "mug");
        assert_eq!(
            extraction.container_selector,
            Some("div[data-test-id=\"organic-search-result\"]")
        );
        assert_eq!(extraction.records.len(), 3);
        let mut titles: Vec<&str> = extraction.records.iter().map(|r| r.title.as_str()).collect();
        titles.sort();
        assert_eq!(titles, vec!["Custom Pet Portrait", "Frog Mug Handmade Ceramic", "Vintage Linen Apron"]);
    }

    #[test]
    fn test_records_ranked_by_popularity_estimate() {
        let records = extractor().extract(THREE_CONTAINERS, "mug").records;
        let ranked: Vec<u32> = records.iter().map(|r| r.estimated.sales_count).collect();
        assert_eq!(ranked, vec![300, 120, 0]);
        assert_eq!(records[0].title, "Vintage Linen Apron");
    }

    #[test]
    fn test_scraped_fields() {
        let records = extractor().extract(THREE_CONTAINERS, "Mug").records;
        let frog = records.iter().find(|r| r.title.starts_with("Frog")).unwrap();
        assert_eq!(frog.price, "$24.00");
        assert_eq!(frog.shop_name, "FrogStudio");
        assert_eq!(frog.url, "https://www.etsy.com/listing/1/frog-mug");
        assert_eq!(frog.image_url, "https://i.etsystatic.com/1.jpg");
        assert!(frog.is_star_seller);
        assert!(!frog.is_best_seller);
        assert_eq!(frog.keywords, vec!["mug", "handmade", "frog"]);

        let apron = records.iter().find(|r| r.title.starts_with("Vintage")).unwrap();
        assert_eq!(apron.price, "€18,50");
        assert_eq!(apron.url, "https://www.etsy.com/listing/2/apron");
        assert!(apron.is_best_seller);

        let portrait = records.iter().find(|r| r.title.starts_with("Custom")).unwrap();
        assert_eq!(portrait.price, "£40");
        assert_eq!(portrait.shop_name, "Unknown Shop");
        assert_eq!(portrait.url, "");
        assert_eq!(portrait.image_url, "");
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let html = r#"<div data-test-id="organic-search-result"><p class="price">24.00</p></div>"#;
        let records = extractor().extract(html, "mug").records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Unknown Title");
        assert_eq!(records[0].price, "$0.00");
    }

    #[test]
    fn test_no_containers_yields_empty_extraction() {
        let extraction = extractor().extract("<html><body><p>Nothing here</p></body></html>", "mug");
        assert!(extraction.records.is_empty());
        assert!(extraction.container_selector.is_none());
    }

    #[test]
    fn test_random_estimates_are_bounded() {
        let extractor = ListingExtractor::new(Url::parse("https://www.etsy.com").unwrap(), Arc::new(RandomEstimator));
        for record in extractor.extract(THREE_CONTAINERS, "mug").records {
            assert!((4.0..=5.0).contains(&record.estimated.shop_rating));
            assert!((30..=365).contains(&record.estimated.listing_age_days));
        }
    }

    #[test]
    fn test_record_keywords() {
        assert_eq!(
            record_keywords("Personalized Vintage Gift Box", "Gift"),
            vec!["gift", "personalized", "vintage"]
        );
        let keywords = record_keywords("Cute Funny Cool Trendy Modern Unique Custom Mug", "mug");
        assert_eq!(keywords.len(), 6);
        assert_eq!(keywords[0], "mug");
    }
}
