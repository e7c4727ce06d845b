//! Tab enumeration over the browser's remote debugging endpoint.
//!
//! Chromium-based browsers started with `--remote-debugging-port=9222`
//! expose `GET /json/list`, which returns one descriptor per target
//! (pages, iframes, workers, extensions). [`TabCapture`] keeps the page
//! targets that survive an ordered list of [`ExclusionRule`]s, cleans their
//! titles, and drops duplicate URLs (first occurrence wins).

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::models::Tab;
use crate::text::{decode_entities, strip_invisible};

/// One entry of the debugging endpoint's target list.
#[derive(Debug, Clone, Deserialize)]
pub struct DebugTarget {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// A predicate that removes noise targets.
///
/// Rules are evaluated in list order and the first match wins, so adding
/// an exclusion means appending a value, not editing code.
#[derive(Debug, Clone)]
pub enum ExclusionRule {
    /// URL starts with the given prefix (internal schemes, new-tab pages).
    UrlPrefix(String),
    /// URL contains the given substring.
    UrlContains(String),
    /// URL contains every one of the given substrings.
    UrlContainsAll(Vec<String>),
    /// URL matches the regular expression.
    UrlMatches(Regex),
    /// Title is empty after trimming.
    EmptyTitle,
}

impl ExclusionRule {
    pub fn matches(&self, target: &DebugTarget) -> bool {
        let url = target.url.as_str();
        match self {
            ExclusionRule::UrlPrefix(prefix) => url.starts_with(prefix.as_str()),
            ExclusionRule::UrlContains(needle) => url.contains(needle.as_str()),
            ExclusionRule::UrlContainsAll(needles) => {
                needles.iter().all(|n| url.contains(n.as_str()))
            }
            ExclusionRule::UrlMatches(re) => re.is_match(url),
            ExclusionRule::EmptyTitle => target.title.trim().is_empty(),
        }
    }
}

const INTERNAL_PREFIXES: &[&str] = &[
    "chrome://",
    "brave://",
    "edge://",
    "about:",
    "devtools://",
    "chrome-extension://",
    "chrome-untrusted://",
    "chrome-search://",
    "view-source:",
];

static CHALLENGE_PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("recaptcha|RotateCookiesPage").unwrap());

/// The built-in exclusion list, in evaluation order.
pub fn default_rules() -> Vec<ExclusionRule> {
    let mut rules: Vec<ExclusionRule> = INTERNAL_PREFIXES
        .iter()
        .map(|p| ExclusionRule::UrlPrefix(p.to_string()))
        .collect();
    rules.push(ExclusionRule::EmptyTitle);
    rules.push(ExclusionRule::UrlContains("youtube.com/embed".to_string()));
    rules.push(ExclusionRule::UrlMatches(CHALLENGE_PAGE_RE.clone()));
    rules.push(ExclusionRule::UrlContains("seamlessaccess".to_string()));
    rules.push(ExclusionRule::UrlContains("accounts.google.com".to_string()));
    rules.push(ExclusionRule::UrlContainsAll(vec![
        "stackblitz.com".to_string(),
        "headless".to_string(),
    ]));
    rules
}

/// Default rules followed by the ones configured in `[capture]`.
pub fn rules_from_config(config: &CaptureConfig) -> anyhow::Result<Vec<ExclusionRule>> {
    let mut rules = default_rules();
    for needle in &config.exclude_url_contains {
        rules.push(ExclusionRule::UrlContains(needle.clone()));
    }
    for pattern in &config.exclude_url_patterns {
        rules.push(ExclusionRule::UrlMatches(Regex::new(pattern)?));
    }
    Ok(rules)
}

/// Decode entities, drop invisible characters, trim.
pub fn clean_title(raw: &str) -> String {
    strip_invisible(&decode_entities(raw)).trim().to_string()
}

/// Turn raw targets into session tabs: pages only, rules applied in order,
/// duplicate URLs dropped, discovery order kept.
pub fn select_tabs(
    targets: &[DebugTarget],
    rules: &[ExclusionRule],
    captured_at: DateTime<Utc>,
) -> Vec<Tab> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut tabs = Vec::new();

    for target in targets {
        if target.target_type != "page" {
            continue;
        }
        if rules.iter().any(|rule| rule.matches(target)) {
            continue;
        }
        if !seen.insert(target.url.as_str()) {
            continue;
        }
        tabs.push(Tab::new(clean_title(&target.title), &target.url, captured_at));
    }

    tabs
}

/// Owns the connection to one debugging endpoint for the duration of a run.
pub struct TabCapture {
    client: reqwest::Client,
    endpoint: String,
    rules: Vec<ExclusionRule>,
}

impl TabCapture {
    pub fn new(endpoint: &str, timeout: Duration, rules: Vec<ExclusionRule>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            rules,
        })
    }

    pub fn from_config(config: &CaptureConfig) -> anyhow::Result<Self> {
        Self::new(
            &config.endpoint,
            Duration::from_secs(config.timeout_secs),
            rules_from_config(config)?,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Enumerate the currently open tabs.
    pub async fn capture(&self) -> Result<Vec<Tab>, CaptureError> {
        let targets = self.list_targets().await?;
        let tabs = select_tabs(&targets, &self.rules, Utc::now());
        tracing::debug!(
            targets = targets.len(),
            kept = tabs.len(),
            "captured tabs from {}",
            self.endpoint
        );
        Ok(tabs)
    }

    /// Fetch the raw target list. Older endpoints only serve `/json`.
    pub async fn list_targets(&self) -> Result<Vec<DebugTarget>, CaptureError> {
        let mut last_status = None;
        for path in ["/json/list", "/json"] {
            let url = format!("{}{}", self.endpoint, path);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| CaptureError::Connection {
                    endpoint: self.endpoint.clone(),
                    source: e,
                })?;

            let status = response.status();
            if status.as_u16() == 404 {
                last_status = Some(status);
                continue;
            }
            if !status.is_success() {
                return Err(self.invalid(format!("HTTP {}", status)));
            }

            let body = response
                .text()
                .await
                .map_err(|e| self.invalid(e.to_string()))?;
            return serde_json::from_str::<Vec<DebugTarget>>(&body)
                .map_err(|e| self.invalid(e.to_string()));
        }

        Err(self.invalid(format!(
            "no target list found (last status {})",
            last_status.map(|s| s.to_string()).unwrap_or_default()
        )))
    }

    fn invalid(&self, reason: String) -> CaptureError {
        CaptureError::InvalidResponse {
            endpoint: self.endpoint.clone(),
            reason,
        }
    }
}

/// Capture tabs from `endpoint` with the default exclusion rules.
pub async fn capture(endpoint: &str) -> Result<Vec<Tab>, CaptureError> {
    let capture = TabCapture::new(endpoint, Duration::from_secs(5), default_rules()).map_err(|e| {
        CaptureError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    })?;
    capture.capture().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(kind: &str, title: &str, url: &str) -> DebugTarget {
        DebugTarget {
            id: String::new(),
            target_type: kind.to_string(),
            title: title.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn keeps_only_clean_page_targets() {
        let targets = vec![
            target("page", "Test Page &amp; Title", "https://example.com"),
            target("iframe", "Embedded Content", "https://embedded.com"),
            target("page", "", "chrome-extension://test"),
            target("iframe", "YouTube Video", "https://youtube.com/embed/test"),
            target("service_worker", "sw", "https://example.com/sw.js"),
            target("page", "New Tab", "chrome://newtab/"),
            target("page", "Blank", "about:blank"),
        ];
        let tabs = select_tabs(&targets, &default_rules(), Utc::now());
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].url, "https://example.com");
        assert_eq!(tabs[0].title, "Test Page & Title");
    }

    #[test]
    fn duplicate_urls_keep_first_in_order() {
        let targets = vec![
            target("page", "First", "https://a.com"),
            target("page", "Second", "https://b.com"),
            target("page", "First again", "https://a.com"),
            target("page", "Third", "https://c.com"),
        ];
        let tabs = select_tabs(&targets, &default_rules(), Utc::now());
        let titles: Vec<&str> = tabs.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn noise_urls_from_login_flows_are_dropped() {
        let targets = vec![
            target("page", "Sign in", "https://accounts.google.com/signin"),
            target("page", "Captcha", "https://www.google.com/recaptcha/api2"),
            target("page", "SSO", "https://service.seamlessaccess.org/ps/"),
            target("page", "Preview", "https://stackblitz.com/headless?x=1"),
            target("page", "StackBlitz", "https://stackblitz.com/edit/app"),
        ];
        let tabs = select_tabs(&targets, &default_rules(), Utc::now());
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].title, "StackBlitz");
    }

    #[test]
    fn configured_rules_are_appended() {
        let config = CaptureConfig {
            exclude_url_contains: vec!["intranet.local".to_string()],
            exclude_url_patterns: vec![r"^https://mail\.".to_string()],
            ..CaptureConfig::default()
        };
        let rules = rules_from_config(&config).unwrap();
        assert_eq!(rules.len(), default_rules().len() + 2);

        let targets = vec![
            target("page", "Wiki", "http://intranet.local/wiki"),
            target("page", "Mail", "https://mail.example.com/inbox"),
            target("page", "Docs", "https://docs.rs"),
        ];
        let tabs = select_tabs(&targets, &rules, Utc::now());
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].url, "https://docs.rs");
    }

    #[test]
    fn title_cleanup() {
        assert_eq!(clean_title("  Rust &lt;3\u{200b} "), "Rust <3");
        assert_eq!(clean_title("Test\u{0}Title"), "TestTitle");
    }
}
