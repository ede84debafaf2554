use super::{element_text, filter_terms, SelectorChain};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

/// Title selectors shared with listing extraction, highest fidelity first.
pub(crate) const TITLE_SELECTORS: &[&str] = &[
    "h3.v2-listing-card__title",
    "h3[data-test-id=\"listing-link\"]",
    "a[data-test-id=\"listing-link\"] h3",
    ".v2-listing-card__title",
    "h3",
];

const MAX_TITLES: usize = 50;
const MAX_TERMS_PER_TITLE: usize = 5;
const MAX_SUGGESTIONS_PER_SELECTOR: usize = 20;
const MAX_CATEGORIES_PER_SELECTOR: usize = 15;
const MAX_META_KEYWORDS: usize = 10;

const TITLE_STOP_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "from", "up", "about", "into",
    "through", "during", "before", "after", "above", "below", "between", "among", "this", "that", "these", "those",
    "gift", "gifts", "item", "items", "product", "products", "sale", "new", "best", "top", "great", "perfect",
    "amazing", "beautiful", "cute", "cool",
];

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").expect("valid word pattern"));

static COMPOUND_TERMS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(\w+core)\b",
        r"(?i)\b(\w+\s+aesthetic)\b",
        r"(?i)\b(\w+\s+style)\b",
        r"(?i)\b(\w+\s+decor)\b",
        r"(?i)\b(\w+\s+design)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#([A-Za-z]\w*)").expect("valid hashtag pattern"));

/// A raw term plus the strategy that proposed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTerm {
    pub text: String,
    pub source: &'static str,
}

pub trait TermStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn candidates(&self, document: &Html, base_url: &Url) -> Vec<String>;
}

fn parse_all(sources: &[&str]) -> Vec<Selector> {
    sources.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Per-strategy bounds applied to candidates before the shared filter.
/// Lengths are exclusive; skip words match case-insensitively as substrings.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    above: usize,
    below: usize,
    skip: &'static [&'static str],
}

impl Bounds {
    const fn new(above: usize, below: usize) -> Self {
        Self { above, below, skip: &[] }
    }

    const fn skipping(self, skip: &'static [&'static str]) -> Self {
        Self { skip, ..self }
    }

    fn admit(&self, text: String) -> Option<String> {
        let len = text.chars().count();
        if len <= self.above || len >= self.below {
            return None;
        }
        let lower = text.to_lowercase();
        if self.skip.iter().any(|word| lower.contains(word)) {
            return None;
        }
        Some(text)
    }
}

const SUGGESTION_BOUNDS: Bounds = Bounds::new(3, 30).skipping(&["sign", "cart", "account", "help"]);
const SEARCH_TERM_BOUNDS: Bounds = Bounds::new(3, 30);
const CATEGORY_BOUNDS: Bounds = Bounds::new(3, 25).skipping(&["home", "shop", "sell", "help"]);
const TAG_BOUNDS: Bounds = Bounds::new(3, 20);
const META_BOUNDS: Bounds = Bounds::new(3, 25);

/// Keywords mined from the listing titles on the page.
pub struct ListingTitles {
    titles: SelectorChain,
}

impl Default for ListingTitles {
    fn default() -> Self {
        Self {
            titles: SelectorChain::new("title", TITLE_SELECTORS),
        }
    }
}

impl TermStrategy for ListingTitles {
    fn name(&self) -> &'static str {
        "listing_titles"
    }

    fn candidates(&self, document: &Html, _base_url: &Url) -> Vec<String> {
        let Some((selector, titles)) = self.titles.first_in_document(document) else {
            return Vec::new();
        };
        debug!("Found {} titles with selector: {}", titles.len(), selector);
        titles
            .iter()
            .take(MAX_TITLES)
            .map(element_text)
            .filter(|title| title.chars().count() > 5)
            .flat_map(|title| title_keywords(&title))
            .collect()
    }
}

/// Meaningful words and compound style terms from one product title.
pub fn title_keywords(title: &str) -> Vec<String> {
    let lower = title.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();

    for word in WORD.find_iter(&lower).map(|m| m.as_str()) {
        if word.len() > 3 && !TITLE_STOP_WORDS.contains(&word) {
            let keyword = capitalize(word);
            if !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
    }

    for pattern in COMPOUND_TERMS.iter() {
        for caps in pattern.captures_iter(&lower) {
            let keyword = caps[1].split_whitespace().map(capitalize).collect::<Vec<_>>().join(" ");
            if keyword.len() > 5 && !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
    }

    keywords.truncate(MAX_TERMS_PER_TITLE);
    keywords
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Tag-like children of blocks whose class marks them trending or popular.
pub struct TrendingSections {
    blocks: Selector,
    items: Selector,
}

impl Default for TrendingSections {
    fn default() -> Self {
        Self {
            blocks: Selector::parse("div, section").expect("valid selector"),
            items: Selector::parse("a, span, div").expect("valid selector"),
        }
    }
}

fn class_contains(element: &scraper::ElementRef<'_>, needles: &[&str]) -> bool {
    element
        .value()
        .attr("class")
        .map(|class| {
            let class = class.to_lowercase();
            needles.iter().any(|n| class.contains(n))
        })
        .unwrap_or(false)
}

impl TermStrategy for TrendingSections {
    fn name(&self) -> &'static str {
        "trending_sections"
    }

    fn candidates(&self, document: &Html, _base_url: &Url) -> Vec<String> {
        document
            .select(&self.blocks)
            .filter(|block| class_contains(block, &["trending", "popular", "hot"]))
            .flat_map(|block| {
                block
                    .select(&self.items)
                    .filter(|item| class_contains(item, &["keyword", "tag", "trend"]))
                    .map(|item| element_text(&item))
                    .collect::<Vec<_>>()
            })
            .filter_map(non_empty)
            .collect()
    }
}

/// Search-suggestion links: their text and the `q` parameter of their href.
pub struct SearchSuggestions {
    selectors: Vec<Selector>,
}

impl Default for SearchSuggestions {
    fn default() -> Self {
        Self {
            selectors: parse_all(&[
                "a[href*=\"/search?q=\"]",
                "a[href*=\"search\"]",
                ".search-suggestion",
                ".popular-search",
                "[data-test-id*=\"search\"]",
            ]),
        }
    }
}

/// Decoded `q` parameter of a (possibly relative) search link.
pub fn search_term_from_href(href: &str, base_url: &Url) -> Option<String> {
    let url = base_url.join(href).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "q")
        .map(|(_, value)| value.into_owned())
        .and_then(non_empty)
}

impl TermStrategy for SearchSuggestions {
    fn name(&self) -> &'static str {
        "search_suggestions"
    }

    fn candidates(&self, document: &Html, base_url: &Url) -> Vec<String> {
        let mut found = Vec::new();
        for selector in &self.selectors {
            for element in document.select(selector).take(MAX_SUGGESTIONS_PER_SELECTOR) {
                if let Some(text) = SUGGESTION_BOUNDS.admit(element_text(&element)) {
                    found.push(text);
                }
                if let Some(term) = element
                    .value()
                    .attr("href")
                    .and_then(|href| search_term_from_href(href, base_url))
                    .and_then(|term| SEARCH_TERM_BOUNDS.admit(term))
                {
                    found.push(term);
                }
            }
        }
        found
    }
}

/// Category and navigation link labels.
pub struct CategoryLinks {
    selectors: Vec<Selector>,
}

impl Default for CategoryLinks {
    fn default() -> Self {
        Self {
            selectors: parse_all(&["a[href*=\"/c/\"]", ".category-link", ".nav-link", "[data-test-id*=\"category\"]"]),
        }
    }
}

impl TermStrategy for CategoryLinks {
    fn name(&self) -> &'static str {
        "category_links"
    }

    fn candidates(&self, document: &Html, _base_url: &Url) -> Vec<String> {
        self.selectors
            .iter()
            .flat_map(|selector| {
                document
                    .select(selector)
                    .take(MAX_CATEGORIES_PER_SELECTOR)
                    .map(|el| element_text(&el))
            })
            .filter_map(|text| CATEGORY_BOUNDS.admit(text))
            .collect()
    }
}

/// Trending tags and badges.
pub struct TagBadges {
    selectors: Vec<Selector>,
}

impl Default for TagBadges {
    fn default() -> Self {
        Self {
            selectors: parse_all(&[
                ".trending-tag",
                ".popular-tag",
                ".badge",
                "[class*=\"trend\"]",
                "[class*=\"popular\"]",
            ]),
        }
    }
}

impl TermStrategy for TagBadges {
    fn name(&self) -> &'static str {
        "tag_badges"
    }

    fn candidates(&self, document: &Html, _base_url: &Url) -> Vec<String> {
        self.selectors
            .iter()
            .flat_map(|selector| document.select(selector).map(|el| element_text(&el)))
            .filter_map(|text| TAG_BOUNDS.admit(text))
            .collect()
    }
}

/// Comma-separated `<meta name="keywords">` content.
pub struct MetaKeywords {
    selector: Selector,
}

impl Default for MetaKeywords {
    fn default() -> Self {
        Self {
            selector: Selector::parse("meta[name=\"keywords\"]").expect("valid selector"),
        }
    }
}

impl TermStrategy for MetaKeywords {
    fn name(&self) -> &'static str {
        "meta_keywords"
    }

    fn candidates(&self, document: &Html, _base_url: &Url) -> Vec<String> {
        document
            .select(&self.selector)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .map(|content| {
                content
                    .split(',')
                    .take(MAX_META_KEYWORDS)
                    .filter_map(|k| META_BOUNDS.admit(k.trim().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `#hashtag` tokens in visible text.
#[derive(Default)]
pub struct Hashtags;

impl TermStrategy for Hashtags {
    fn name(&self) -> &'static str {
        "hashtags"
    }

    fn candidates(&self, document: &Html, _base_url: &Url) -> Vec<String> {
        let mut found = Vec::new();
        for node in document.tree.nodes() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element().map(|el| el.name()))
                .map(|name| name == "script" || name == "style")
                .unwrap_or(false);
            if hidden {
                continue;
            }
            found.extend(HASHTAG.captures_iter(text).map(|caps| caps[1].to_string()));
        }
        found
    }
}

/// Runs every strategy and accumulates their candidates.
pub struct TermExtractor {
    base_url: Url,
    strategies: Vec<Box<dyn TermStrategy>>,
}

impl TermExtractor {
    pub fn new(base_url: Url) -> Self {
        Self::with_strategies(base_url, Self::default_strategies())
    }

    pub fn with_strategies(base_url: Url, strategies: Vec<Box<dyn TermStrategy>>) -> Self {
        Self { base_url, strategies }
    }

    pub fn default_strategies() -> Vec<Box<dyn TermStrategy>> {
        vec![
            Box::new(ListingTitles::default()),
            Box::new(TrendingSections::default()),
            Box::new(SearchSuggestions::default()),
            Box::new(CategoryLinks::default()),
            Box::new(TagBadges::default()),
            Box::new(MetaKeywords::default()),
            Box::new(Hashtags),
        ]
    }

    pub fn candidates(&self, html: &str) -> Vec<CandidateTerm> {
        let document = Html::parse_document(html);
        let mut all = Vec::new();
        for strategy in &self.strategies {
            let found = strategy.candidates(&document, &self.base_url);
            if !found.is_empty() {
                debug!("Strategy {} proposed {} candidates", strategy.name(), found.len());
            }
            all.extend(found.into_iter().map(|text| CandidateTerm {
                text,
                source: strategy.name(),
            }));
        }
        all
    }

    /// Candidates from every strategy, filtered and deduplicated.
    pub fn extract(&self, html: &str) -> Vec<String> {
        let candidates = self.candidates(html);
        let total = candidates.len();
        let terms = filter_terms(candidates.into_iter().map(|c| c.text));
        info!("Extracted {} trending keywords from {} candidates", terms.len(), total);
        terms
    }
}
