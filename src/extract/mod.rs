pub mod filter;
pub mod listings;
pub mod terms;

pub use filter::{filter_terms, with_fallback, DEFAULT_TERMS, DEFAULT_TERM_LIMIT};
pub use listings::{ListingExtraction, ListingExtractor};
pub use terms::{CandidateTerm, TermExtractor, TermStrategy};

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

/// A named, ordered list of CSS selectors tried until one matches.
#[derive(Debug)]
pub struct SelectorChain {
    name: &'static str,
    selectors: Vec<(&'static str, Selector)>,
}

impl SelectorChain {
    pub fn new(name: &'static str, sources: &[&'static str]) -> Self {
        let selectors = sources
            .iter()
            .filter_map(|source| match Selector::parse(source) {
                Ok(selector) => Some((*source, selector)),
                Err(e) => {
                    warn!("Skipping invalid {} selector '{}': {:?}", name, source, e);
                    None
                }
            })
            .collect();
        Self { name, selectors }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// All elements of the document matched by the first selector with any
    /// match, together with that selector.
    pub fn first_in_document<'a>(&self, document: &'a Html) -> Option<(&'static str, Vec<ElementRef<'a>>)> {
        self.selectors.iter().find_map(|(source, selector)| {
            let found: Vec<_> = document.select(selector).collect();
            (!found.is_empty()).then_some((*source, found))
        })
    }

    /// First element under `scope` matched by the highest-priority selector
    /// that satisfies `accept`.
    pub fn first_in<'a, F>(&self, scope: ElementRef<'a>, accept: F) -> Option<ElementRef<'a>>
    where
        F: Fn(&ElementRef<'a>) -> bool,
    {
        self.selectors
            .iter()
            .find_map(|(_, selector)| scope.select(selector).next().filter(|el| accept(el)))
    }

    /// The first element of every selector, in priority order.
    pub fn each_first<'a, 's>(&'s self, scope: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 's
    where
        'a: 's,
    {
        self.selectors
            .iter()
            .filter_map(move |(_, selector)| scope.select(selector).next())
    }
}

/// Text content of an element with runs of whitespace collapsed.
pub fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_in_document_uses_first_matching_selector() {
        let html = Html::parse_document(
            r#"<div class="b">one</div><div class="b">two</div><div class="c">three</div>"#,
        );
        let chain = SelectorChain::new("test", &["div.a", "div.b", "div.c"]);
        let (selector, found) = chain.first_in_document(&html).unwrap();
        assert_eq!(selector, "div.b");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_invalid_selector_is_skipped() {
        let chain = SelectorChain::new("test", &["div[", "p"]);
        let html = Html::parse_document("<p>hello</p>");
        let (selector, _) = chain.first_in_document(&html).unwrap();
        assert_eq!(selector, "p");
    }

    #[test]
    fn test_element_text_collapses_whitespace() {
        let html = Html::parse_fragment("<p>  Hand\n   made <b>mug</b>  </p>");
        let p = Selector::parse("p").unwrap();
        let el = html.select(&p).next().unwrap();
        assert_eq!(element_text(&el), "Hand made mug");
    }
}
