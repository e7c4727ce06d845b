//! Offline classification from the URL's domain and the page's words.
//!
//! Known domains map straight to a category; otherwise keyword hits over
//! the title and content pick the category, and `Other` is the floor.
//! Tags are the most frequent non-trivial words. This provider never
//! fails, which makes it the natural last entry in a preference list.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;

use super::{Classification, ClassifyProvider, ClassifyRequest};

const MAX_KEYWORD_TAGS: usize = 5;

const DOMAIN_CATEGORIES: &[(&str, &str)] = &[
    ("youtube.com", "YouTube"),
    ("youtu.be", "YouTube"),
    ("github.com", "Coding"),
    ("gitlab.com", "Coding"),
    ("bitbucket.org", "Coding"),
    ("stackoverflow.com", "Coding"),
    ("docs.rs", "Coding"),
    ("crates.io", "Coding"),
    ("facebook.com", "Social Media"),
    ("twitter.com", "Social Media"),
    ("x.com", "Social Media"),
    ("instagram.com", "Social Media"),
    ("reddit.com", "Social Media"),
    ("linkedin.com", "Social Media"),
    ("arxiv.org", "Research"),
    ("scholar.google.com", "Research"),
    ("bbc.co.uk", "News"),
    ("cnn.com", "News"),
    ("nytimes.com", "News"),
    ("amazon.com", "Shopping"),
    ("ebay.com", "Shopping"),
];

const KEYWORD_CATEGORIES: &[(&str, &[&str])] = &[
    ("Research", &["research", "paper", "study", "journal", "abstract", "arxiv"]),
    ("Coding", &["rust", "python", "javascript", "code", "programming", "api", "compiler", "library"]),
    ("News", &["news", "breaking", "election", "report"]),
    ("Shopping", &["price", "cart", "buy", "shipping", "deal"]),
    ("Education", &["course", "tutorial", "lesson", "learn"]),
    ("Entertainment", &["movie", "music", "game", "episode", "trailer"]),
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "you", "your", "not",
    "but", "have", "has", "can", "will", "all", "its", "our", "out", "how", "what", "when",
    "who", "why", "more", "about", "into", "than", "then", "there", "their", "they", "them",
    "http", "https", "www", "com", "org", "net", "html",
];

/// Category for well-known hosts (`www.` and subdomains included).
pub fn main_category_for_url(url: &str) -> Option<&'static str> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").to_ascii_lowercase();
    DOMAIN_CATEGORIES
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{}", domain)))
        .map(|(_, category)| *category)
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn keyword_category(text: &str) -> &'static str {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in words(text) {
        *counts.entry(word).or_insert(0) += 1;
    }

    let mut best = ("Other", 0usize);
    for (category, keywords) in KEYWORD_CATEGORIES {
        let score: usize = keywords.iter().filter_map(|k| counts.get(*k)).sum();
        if score > best.1 {
            best = (*category, score);
        }
    }
    best.0
}

fn frequent_terms(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, word) in words(text).enumerate() {
        if word.chars().count() < 3
            || !word.chars().all(char::is_alphabetic)
            || STOPWORDS.contains(&word.as_str())
        {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> =
        counts.into_iter().map(|(w, (n, first))| (w, n, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(limit).map(|(w, _, _)| w).collect()
}

pub struct KeywordProvider {
    max_tags: usize,
}

impl KeywordProvider {
    pub fn new(max_tags: usize) -> Self {
        Self {
            max_tags: max_tags.min(MAX_KEYWORD_TAGS),
        }
    }
}

#[async_trait]
impl ClassifyProvider for KeywordProvider {
    fn id(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<Classification> {
        let text = format!("{}\n{}", request.title, request.text);
        let category = main_category_for_url(&request.url)
            .unwrap_or_else(|| keyword_category(&text))
            .to_string();
        Ok(Classification {
            category,
            tags: frequent_terms(&text, self.max_tags),
        })
    }
}
