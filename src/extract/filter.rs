use std::collections::HashSet;

pub const DEFAULT_TERM_LIMIT: usize = 16;

/// Minimum number of extracted terms before the defaults are mixed in.
pub const MIN_EXTRACTED_TERMS: usize = 5;

pub const DEFAULT_TERMS: &[&str] = &[
    "Cottagecore",
    "Dark Academia",
    "Y2K Aesthetic",
    "Minimalist Design",
    "Boho Chic",
    "Vintage Retro",
    "Plant Mom",
    "Self Care",
    "Motivational Quotes",
    "Astrology",
    "Crystal Healing",
    "Sustainable Living",
    "Mental Health Awareness",
    "Dopamine Decor",
    "Grandmillennial",
    "Maximalist",
    "Japandi Style",
];

/// Navigational and boilerplate terms, compared case-insensitively.
const STOP_LIST: &[&str] = &[
    "etsy", "shop", "store", "buy", "sell", "cart", "account", "sign", "sign in", "log in", "help", "home",
    "page", "search", "filter", "sort", "view", "more", "less", "shipping", "delivery", "return", "policy",
    "terms", "privacy", "contact", "about", "blog", "news", "press", "careers", "investors",
];

const MIN_TERM_CHARS: usize = 3;
const MAX_TERM_CHARS: usize = 30;

/// Cleans raw candidates: length and character checks, stop-list, whitespace
/// collapse, title case, first-seen dedup, then ascending length order.
/// Applying it to its own output returns the same list.
pub fn filter_terms<I, S>(candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut filtered: Vec<String> = candidates
        .into_iter()
        .filter_map(|candidate| normalize(candidate.as_ref()))
        .filter(|term| seen.insert(term.clone()))
        .collect();
    filtered.sort_by_key(|term| term.chars().count());
    filtered
}

/// Pads a short list with [`DEFAULT_TERMS`] and truncates to `limit`.
pub fn with_fallback(filtered: Vec<String>, limit: usize) -> Vec<String> {
    let mut terms = filtered;
    if terms.len() < MIN_EXTRACTED_TERMS {
        let mut seen: HashSet<String> = terms.iter().cloned().collect();
        terms.extend(
            DEFAULT_TERMS
                .iter()
                .map(|t| t.to_string())
                .filter(|t| seen.insert(t.clone())),
        );
    }
    terms.truncate(limit);
    terms
}

fn normalize(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let len = collapsed.chars().count();
    if !(MIN_TERM_CHARS..=MAX_TERM_CHARS).contains(&len) {
        return None;
    }
    if collapsed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !collapsed.chars().all(|c| c.is_ascii_alphabetic() || c == ' ') {
        return None;
    }
    let lower = collapsed.to_lowercase();
    if STOP_LIST.contains(&lower.as_str()) {
        return None;
    }
    Some(title_case(&lower))
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
