//! Core data models used throughout tabman.
//!
//! These types represent the tabs, sessions, and categorization results that
//! flow through the capture → fetch → categorize → save pipeline and back out
//! of the search index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category assigned when no provider could classify a tab.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// One open browser tab, enriched as it moves through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub title: String,
    pub url: String,
    /// Extracted page text. Only lives for the duration of a run.
    #[serde(skip)]
    pub content: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub fetch_failed: bool,
    /// Identifier of the provider that produced `category` and `tags`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

fn default_category() -> String {
    UNCATEGORIZED.to_string()
}

impl Tab {
    pub fn new(title: impl Into<String>, url: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: None,
            category: UNCATEGORIZED.to_string(),
            tags: Vec::new(),
            captured_at,
            fetch_failed: false,
            provider: None,
        }
    }

    /// Text handed to classifiers: fetched content when available, otherwise
    /// the title and URL.
    pub fn classification_text(&self) -> String {
        match self.content.as_deref() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => format!("{}\n{}", self.title, self.url),
        }
    }

    pub fn apply(&mut self, result: CategorizationResult) {
        self.category = result.category;
        self.tags = result.tags;
        self.provider = Some(result.provider);
    }
}

/// The ordered tabs gathered by one pipeline run.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub started_at: DateTime<Utc>,
    pub tabs: Vec<Tab>,
}

impl CaptureSession {
    pub fn new(started_at: DateTime<Utc>, tabs: Vec<Tab>) -> Self {
        Self { started_at, tabs }
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }
}

/// Normalized output of a classification provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizationResult {
    pub category: String,
    pub tags: Vec<String>,
    pub provider: String,
}
