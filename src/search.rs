//! Read path over saved snapshots.
//!
//! [`SearchIndex::build`] loads every `snapshots/tabs_*.json` file under a
//! data directory in file-name order (which is chronological), keeping the
//! records in load order. Queries re-scan the in-memory set each time;
//! nothing here writes to disk.
//!
//! # Filters
//!
//! All filters are optional and combine with AND:
//! - `term`: case-insensitive substring of title, URL, category, or any tag
//! - `tag`: case-insensitive substring of at least one tag
//! - `category`: case-insensitive exact category match
//!
//! # Sorting
//!
//! | Key | Order |
//! |-----|-------|
//! | `newest` (default) | capture time, most recent first |
//! | `title` | title, case-insensitive ascending |
//! | `host` | URL host ascending, grouping tabs per site |
//!
//! Ties keep load order. `limit` applies after sorting.

use anyhow::{bail, Result};
use reqwest::Url;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::Config;
use crate::models::Tab;
use crate::save::Snapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Newest,
    Title,
    Host,
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" | "date" => Ok(SortKey::Newest),
            "title" => Ok(SortKey::Title),
            "host" | "domain" => Ok(SortKey::Host),
            other => bail!("Unknown sort key: {}. Use newest, title, or host.", other),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::Newest => "newest",
            SortKey::Title => "title",
            SortKey::Host => "host",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub term: Option<String>,
    pub tag: Option<String>,
    pub category: Option<String>,
    pub sort: SortKey,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            term: Some(term.into()),
            ..Self::default()
        }
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }
}

/// Lowercased, blank-filtered form of a query used during the scan.
struct Needles {
    term: Option<String>,
    tag: Option<String>,
    category: Option<String>,
}

impl Needles {
    fn from_query(query: &SearchQuery) -> Self {
        fn prep(s: &Option<String>) -> Option<String> {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
        }
        Self {
            term: prep(&query.term),
            tag: prep(&query.tag),
            category: prep(&query.category),
        }
    }

    fn matches(&self, tab: &Tab) -> bool {
        if let Some(term) = &self.term {
            let hit = tab.title.to_lowercase().contains(term)
                || tab.url.to_lowercase().contains(term)
                || tab.category.to_lowercase().contains(term)
                || tab.tags.iter().any(|t| t.to_lowercase().contains(term));
            if !hit {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !tab.tags.iter().any(|t| t.to_lowercase().contains(tag)) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if tab.category.to_lowercase() != *category {
                return false;
            }
        }
        true
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase()))
        .unwrap_or_default()
}

pub struct SearchIndex {
    root: PathBuf,
    tabs: Vec<Tab>,
    skipped: Vec<PathBuf>,
}

impl SearchIndex {
    /// Load all snapshots under `root`. A missing snapshot directory yields
    /// an empty index.
    pub fn build(root: impl Into<PathBuf>) -> Result<Self> {
        let mut index = Self {
            root: root.into(),
            tabs: Vec::new(),
            skipped: Vec::new(),
        };
        index.reload()?;
        Ok(index)
    }

    /// Re-read every snapshot from disk, replacing the in-memory set.
    pub fn reload(&mut self) -> Result<()> {
        let (tabs, skipped) = load_snapshots(&self.root.join("snapshots"))?;
        self.tabs = tabs;
        self.skipped = skipped;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Snapshot files that could not be read on the last load.
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    pub fn query(&self, query: &SearchQuery) -> Vec<Tab> {
        let needles = Needles::from_query(query);
        let mut hits: Vec<&Tab> = self.tabs.iter().filter(|t| needles.matches(t)).collect();

        // `sort_by` is stable, so ties keep load order.
        match query.sort {
            SortKey::Newest => hits.sort_by(|a, b| b.captured_at.cmp(&a.captured_at)),
            SortKey::Title => hits.sort_by(|a, b| cmp_folded(&a.title, &b.title)),
            SortKey::Host => hits.sort_by_cached_key(|t| host_of(&t.url)),
        }

        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        hits.into_iter().cloned().collect()
    }

    /// Distinct categories with their tab counts, most populated first.
    pub fn categories(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for tab in &self.tabs {
            *counts.entry(tab.category.as_str()).or_insert(0) += 1;
        }
        let mut out: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(name, n)| (name.to_string(), n))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

/// `tabman search`: print matching tabs, numbered, or as a JSON array.
pub fn run_search(config: &Config, query: &SearchQuery, json: bool) -> Result<()> {
    let index = SearchIndex::build(&config.storage.data_dir)?;
    let results = index.query(query);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, tab) in results.iter().enumerate() {
        println!("{}. [{}] {}", i + 1, tab.category, tab.title);
        println!("    url: {}", tab.url);
        if !tab.tags.is_empty() {
            println!("    tags: {}", tab.tags.join(", "));
        }
        println!("    captured: {}", tab.captured_at.format("%Y-%m-%d %H:%M"));
        println!();
    }
    Ok(())
}

/// `tabman categories`: category names with tab counts.
pub fn list_categories(config: &Config) -> Result<()> {
    let index = SearchIndex::build(&config.storage.data_dir)?;
    let categories = index.categories();
    if categories.is_empty() {
        println!("No saved tabs.");
        return Ok(());
    }

    println!("{:<32} TABS", "CATEGORY");
    for (name, count) in categories {
        println!("{:<32} {}", name, count);
    }
    Ok(())
}

fn cmp_folded(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn load_snapshots(dir: &Path) -> Result<(Vec<Tab>, Vec<PathBuf>)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), Vec::new())),
        Err(e) => return Err(anyhow::Error::new(e).context(format!("Failed to read {}", dir.display()))),
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("tabs_") && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    let mut tabs = Vec::new();
    let mut skipped = Vec::new();
    for path in files {
        let parsed = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|text| Ok(serde_json::from_str::<Snapshot>(&text)?));
        match parsed {
            Ok(snapshot) => tabs.extend(snapshot.tabs),
            Err(e) => {
                tracing::warn!("skipping unreadable snapshot {}: {}", path.display(), e);
                skipped.push(path);
            }
        }
    }

    Ok((tabs, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tab(title: &str, url: &str, category: &str, tags: &[&str], hour: u32) -> Tab {
        let mut tab = Tab::new(title, url, Utc.with_ymd_and_hms(2024, 3, 9, hour, 0, 0).unwrap());
        tab.category = category.to_string();
        tab.tags = tags.iter().map(|t| t.to_string()).collect();
        tab
    }

    fn index(tabs: Vec<Tab>) -> SearchIndex {
        SearchIndex {
            root: PathBuf::new(),
            tabs,
            skipped: Vec::new(),
        }
    }

    fn titles(tabs: &[Tab]) -> Vec<&str> {
        tabs.iter().map(|t| t.title.as_str()).collect()
    }

    fn sample() -> SearchIndex {
        index(vec![
            tab("Rust async", "https://a.com", "Programming", &["rust", "async"], 9),
            tab("Tab Manager", "https://b.com/tab", "Productivity", &["tabs"], 9),
        ])
    }

    #[test]
    fn term_category_and_empty_queries() {
        let idx = sample();
        assert_eq!(titles(&idx.query(&SearchQuery::term("rust"))), vec!["Rust async"]);
        assert_eq!(
            titles(&idx.query(&SearchQuery::category("productivity"))),
            vec!["Tab Manager"]
        );
        assert_eq!(
            titles(&idx.query(&SearchQuery::default())),
            vec!["Rust async", "Tab Manager"]
        );
    }

    #[test]
    fn filters_combine_with_and() {
        let idx = sample();
        let query = SearchQuery {
            term: Some("tab".to_string()),
            category: Some("Programming".to_string()),
            ..SearchQuery::default()
        };
        assert!(idx.query(&query).is_empty());

        assert_eq!(titles(&idx.query(&SearchQuery::tag("TAB"))), vec!["Tab Manager"]);
        assert!(idx.query(&SearchQuery::category("Product")).is_empty());
    }

    #[test]
    fn term_and_tag_intersect() {
        let idx = index(vec![
            tab("Rust book", "https://doc.rust-lang.org/book", "Programming", &["ownership"], 9),
            tab("Rust tokio guide", "https://tokio.rs", "Programming", &["async", "runtime"], 10),
            tab("JS promises", "https://js.info/async", "Programming", &["async"], 11),
        ]);
        let query = SearchQuery {
            term: Some("rust".to_string()),
            tag: Some("async".to_string()),
            ..SearchQuery::default()
        };
        assert_eq!(titles(&idx.query(&query)), vec!["Rust tokio guide"]);
    }

    #[test]
    fn sort_keys_and_limit() {
        let idx = index(vec![
            tab("beta", "https://www.zeta.org/1", "Other", &[], 8),
            tab("Alpha", "https://alpha.io/", "Other", &[], 10),
            tab("gamma", "https://zeta.org/2", "Other", &[], 9),
        ]);

        assert_eq!(titles(&idx.query(&SearchQuery::default())), vec!["Alpha", "gamma", "beta"]);

        let by_title = SearchQuery {
            sort: SortKey::Title,
            ..SearchQuery::default()
        };
        assert_eq!(titles(&idx.query(&by_title)), vec!["Alpha", "beta", "gamma"]);

        let by_host = SearchQuery {
            sort: SortKey::Host,
            limit: Some(2),
            ..SearchQuery::default()
        };
        assert_eq!(titles(&idx.query(&by_host)), vec!["Alpha", "beta"]);
    }

    #[test]
    fn category_counts() {
        let idx = index(vec![
            tab("a", "https://a.com", "Coding", &[], 1),
            tab("b", "https://b.com", "Research", &[], 1),
            tab("c", "https://c.com", "Coding", &[], 1),
            tab("d", "https://d.com", "Art", &[], 1),
        ]);
        assert_eq!(
            idx.categories(),
            vec![
                ("Coding".to_string(), 2),
                ("Art".to_string(), 1),
                ("Research".to_string(), 1)
            ]
        );
    }

    #[test]
    fn sort_key_parsing() {
        assert_eq!("Host".parse::<SortKey>().unwrap(), SortKey::Host);
        assert!("random".parse::<SortKey>().is_err());
    }
}
