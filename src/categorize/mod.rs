//! Tab classification through an ordered chain of providers.
//!
//! Defines the [`ClassifyProvider`] trait and the [`Categorizer`] that walks
//! providers until one answers. Concrete providers:
//! - **[`GeminiProvider`]**: Google Gemini `generateContent` API (`GEMINI_API_KEY`).
//! - **[`MistralProvider`]**: Mistral chat completions API (`MISTRAL_API_KEY`).
//! - **[`OllamaProvider`]**: a local Ollama runtime; no credential.
//! - **[`KeywordProvider`]**: offline domain and keyword rules; never needs
//!   the network.
//!
//! # Provider Selection
//!
//! An explicitly requested provider is tried first, then the configured
//! preference order (default `gemini, mistral, ollama, keyword`). Each
//! provider appears at most once in a walk.
//!
//! Every invocation is guarded three ways:
//! - a provider missing its credential is skipped without any request,
//! - a call that exceeds `timeout_secs` is abandoned,
//! - any error falls through to the next provider.
//!
//! Only when every provider has been skipped or failed does
//! [`Categorizer::categorize`] return [`CategorizationError`].

mod keyword;
mod normalize;
mod remote;

pub use keyword::{main_category_for_url, KeywordProvider};
pub use normalize::{normalize_category, normalize_tags, parse_response};
pub use remote::{build_prompt, GeminiProvider, MistralProvider, OllamaProvider};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::CategorizeConfig;
use crate::error::CategorizationError;
use crate::models::{CategorizationResult, Tab, UNCATEGORIZED};
use crate::progress::{PipelineProgressEvent, ProgressReporter};

/// The closed set of built-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Mistral,
    Ollama,
    Keyword,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Gemini,
        ProviderKind::Mistral,
        ProviderKind::Ollama,
        ProviderKind::Keyword,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Keyword => "keyword",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "mistral" => Ok(ProviderKind::Mistral),
            "ollama" => Ok(ProviderKind::Ollama),
            "keyword" | "offline" => Ok(ProviderKind::Keyword),
            other => anyhow::bail!(
                "Unknown provider: '{}'. Must be gemini, mistral, ollama, or keyword.",
                other
            ),
        }
    }
}

/// What a provider gets to look at.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub text: String,
    pub title: String,
    pub url: String,
}

/// Raw provider answer, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub tags: Vec<String>,
}

/// A classification backend.
///
/// Implementations only need to turn a request into a category and tags;
/// credential checks, timeouts, normalization, and fallback are handled by
/// [`Categorizer`].
#[async_trait]
pub trait ClassifyProvider: Send + Sync {
    /// Stable identifier recorded on each tab (e.g. `"gemini"`).
    fn id(&self) -> &str;

    /// Environment variable holding the credential, if one is required.
    fn credential_env(&self) -> Option<&str> {
        None
    }

    /// Whether the provider can be called right now. Providers that need a
    /// key return `false` when it is absent, and are then skipped without
    /// any network traffic.
    fn has_credential(&self) -> bool {
        true
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<Classification>;
}

/// Per-session tally, printed after a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorizeStats {
    pub by_provider: BTreeMap<String, usize>,
    pub uncategorized: usize,
}

pub struct Categorizer {
    providers: Vec<Box<dyn ClassifyProvider>>,
    preference: Vec<String>,
    timeout: Duration,
    max_tags: usize,
}

impl Categorizer {
    /// Build a categorizer whose default order is the registration order.
    pub fn new(providers: Vec<Box<dyn ClassifyProvider>>, timeout: Duration, max_tags: usize) -> Self {
        let preference = providers.iter().map(|p| p.id().to_string()).collect();
        Self {
            providers,
            preference,
            timeout,
            max_tags,
        }
    }

    /// Build every built-in provider; walk them in the configured order.
    pub fn from_config(config: &CategorizeConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let providers: Vec<Box<dyn ClassifyProvider>> = vec![
            Box::new(GeminiProvider::from_env(&config.gemini, timeout)?),
            Box::new(MistralProvider::from_env(&config.mistral, timeout)?),
            Box::new(OllamaProvider::new(&config.ollama, timeout)?),
            Box::new(KeywordProvider::new(config.max_tags)),
        ];
        let mut categorizer = Self::new(providers, timeout, config.max_tags);
        categorizer.preference = config
            .preference
            .iter()
            .map(|k| k.as_str().to_string())
            .collect();
        Ok(categorizer)
    }

    /// Replace the default walk order.
    pub fn with_preference(mut self, preference: Vec<String>) -> Self {
        self.preference = preference;
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn ClassifyProvider> {
        self.providers.iter().map(|p| p.as_ref())
    }

    pub fn preference(&self) -> &[String] {
        &self.preference
    }

    fn find(&self, id: &str) -> Option<&dyn ClassifyProvider> {
        self.providers
            .iter()
            .find(|p| p.id().eq_ignore_ascii_case(id))
            .map(|p| p.as_ref())
    }

    /// Providers in the order they will be tried for one call.
    fn plan(&self, preferred: Option<&str>) -> Vec<&dyn ClassifyProvider> {
        let mut order: Vec<&dyn ClassifyProvider> = Vec::new();
        let candidates = preferred.into_iter().chain(self.preference.iter().map(String::as_str));
        for id in candidates {
            if let Some(provider) = self.find(id) {
                if !order.iter().any(|p| p.id() == provider.id()) {
                    order.push(provider);
                }
            }
        }
        order
    }

    /// Classify one tab's text.
    pub async fn categorize(
        &self,
        text: &str,
        title: &str,
        url: &str,
        preferred: Option<&str>,
    ) -> Result<CategorizationResult, CategorizationError> {
        let request = ClassifyRequest {
            text: text.to_string(),
            title: title.to_string(),
            url: url.to_string(),
        };
        let mut attempts: Vec<(String, String)> = Vec::new();

        for provider in self.plan(preferred) {
            let id = provider.id().to_string();

            if !provider.has_credential() {
                let reason = match provider.credential_env() {
                    Some(var) => format!("{} not set", var),
                    None => "credential missing".to_string(),
                };
                tracing::debug!(provider = %id, "skipping: {}", reason);
                attempts.push((id, reason));
                continue;
            }

            match tokio::time::timeout(self.timeout, provider.classify(&request)).await {
                Ok(Ok(classification)) => {
                    return Ok(CategorizationResult {
                        category: normalize_category(&classification.category),
                        tags: normalize_tags(&classification.tags, self.max_tags),
                        provider: id,
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider = %id, "categorization failed for {}: {:#}", url, e);
                    attempts.push((id, format!("{:#}", e)));
                }
                Err(_) => {
                    tracing::warn!(provider = %id, "categorization timed out for {}", url);
                    attempts.push((id, format!("timed out after {}s", self.timeout.as_secs_f64())));
                }
            }
        }

        Err(CategorizationError { attempts })
    }

    /// Categorize every tab in place. Tabs are never dropped: exhaustion
    /// leaves the sentinel category and no tags.
    pub async fn categorize_session(
        &self,
        tabs: &mut [Tab],
        preferred: Option<&str>,
        progress: &dyn ProgressReporter,
    ) -> CategorizeStats {
        let mut stats = CategorizeStats::default();
        let total = tabs.len() as u64;

        for (i, tab) in tabs.iter_mut().enumerate() {
            let text = tab.classification_text();
            match self.categorize(&text, &tab.title, &tab.url, preferred).await {
                Ok(result) => {
                    *stats.by_provider.entry(result.provider.clone()).or_insert(0) += 1;
                    tab.apply(result);
                }
                Err(e) => {
                    tracing::warn!("{} left uncategorized: {}", tab.url, e);
                    tab.category = UNCATEGORIZED.to_string();
                    tab.tags.clear();
                    tab.provider = None;
                    stats.uncategorized += 1;
                }
            }
            progress.report(PipelineProgressEvent::Categorizing {
                n: i as u64 + 1,
                total,
            });
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behavior {
        Answer(&'static str, &'static [&'static str]),
        Fail,
        Hang,
    }

    struct StubProvider {
        id: &'static str,
        keyed: bool,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl StubProvider {
        fn boxed(id: &'static str, keyed: bool, behavior: Behavior) -> (Box<dyn ClassifyProvider>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let provider = StubProvider {
                id,
                keyed,
                behavior,
                calls: calls.clone(),
            };
            (Box::new(provider), calls)
        }
    }

    #[async_trait]
    impl ClassifyProvider for StubProvider {
        fn id(&self) -> &str {
            self.id
        }
        fn credential_env(&self) -> Option<&str> {
            Some("STUB_KEY")
        }
        fn has_credential(&self) -> bool {
            self.keyed
        }
        async fn classify(&self, _request: &ClassifyRequest) -> Result<Classification> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Answer(category, tags) => Ok(Classification {
                    category: category.to_string(),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                }),
                Behavior::Fail => anyhow::bail!("upstream exploded"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }
    }

    #[tokio::test]
    async fn missing_credential_is_skipped_without_calls() {
        let (cloud, cloud_calls) = StubProvider::boxed("cloud", false, Behavior::Answer("Cloud", &[]));
        let (local, local_calls) =
            StubProvider::boxed("local", true, Behavior::Answer(" Programming ", &["Rust", "rust", "Async"]));
        let categorizer = Categorizer::new(vec![cloud, local], Duration::from_secs(5), 10);

        let result = categorizer.categorize("text", "Rust async", "https://a.com", None).await.unwrap();

        assert_eq!(cloud_calls.load(Ordering::SeqCst), 0);
        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.provider, "local");
        assert_eq!(result.category, "Programming");
        assert_eq!(result.tags, vec!["rust", "async"]);
    }

    #[tokio::test]
    async fn failures_and_timeouts_fall_through() {
        let (failing, _) = StubProvider::boxed("failing", true, Behavior::Fail);
        let (slow, _) = StubProvider::boxed("slow", true, Behavior::Hang);
        let (fallback, _) = StubProvider::boxed("fallback", true, Behavior::Answer("Other", &["misc"]));
        let categorizer = Categorizer::new(vec![failing, slow, fallback], Duration::from_millis(50), 10);

        let result = categorizer.categorize("t", "t", "https://a.com", None).await.unwrap();
        assert_eq!(result.provider, "fallback");
        assert_eq!(result.category, "Other");
    }

    #[tokio::test]
    async fn preferred_provider_goes_first_once() {
        let (first, first_calls) = StubProvider::boxed("first", true, Behavior::Answer("A", &[]));
        let (second, second_calls) = StubProvider::boxed("second", true, Behavior::Answer("B", &[]));
        let categorizer = Categorizer::new(vec![first, second], Duration::from_secs(5), 10);

        let result = categorizer.categorize("t", "t", "u", Some("second")).await.unwrap();
        assert_eq!(result.category, "B");
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);

        let plan: Vec<String> = categorizer
            .plan(Some("second"))
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(plan, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn exhaustion_reports_every_attempt() {
        let (a, _) = StubProvider::boxed("a", false, Behavior::Answer("A", &[]));
        let (b, _) = StubProvider::boxed("b", true, Behavior::Fail);
        let categorizer = Categorizer::new(vec![a, b], Duration::from_secs(5), 10);

        let err = categorizer.categorize("t", "t", "u", None).await.unwrap_err();
        assert_eq!(err.attempts.len(), 2);
        assert_eq!(err.attempts[0].0, "a");
        assert!(err.attempts[0].1.contains("STUB_KEY"));
        assert_eq!(err.attempts[1].0, "b");
    }

    #[tokio::test]
    async fn session_keeps_tabs_on_exhaustion() {
        let (b, _) = StubProvider::boxed("b", true, Behavior::Fail);
        let categorizer = Categorizer::new(vec![b], Duration::from_secs(5), 10);
        let mut tabs = vec![
            Tab::new("one", "https://one.com", Utc::now()),
            Tab::new("two", "https://two.com", Utc::now()),
        ];
        tabs[0].tags = vec!["stale".to_string()];

        let stats = categorizer.categorize_session(&mut tabs, None, &NoProgress).await;

        assert_eq!(tabs.len(), 2);
        assert_eq!(stats.uncategorized, 2);
        assert!(tabs.iter().all(|t| t.category == UNCATEGORIZED && t.tags.is_empty()));
    }

    #[tokio::test]
    async fn offline_fallback_always_answers() {
        let (cloud, _) = StubProvider::boxed("cloud", false, Behavior::Answer("Cloud", &[]));
        let categorizer = Categorizer::new(
            vec![cloud, Box::new(KeywordProvider::new(10))],
            Duration::from_secs(5),
            10,
        );
        let result = categorizer
            .categorize("", "Brave Tab Manager", "https://github.com/Anshulgada/brave-tab-manager", None)
            .await
            .unwrap();
        assert_eq!(result.provider, "keyword");
        assert_eq!(result.category, "Coding");
    }

    #[test]
    fn provider_kind_parsing() {
        assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("offline".parse::<ProviderKind>().unwrap(), ProviderKind::Keyword);
        assert!("openai".parse::<ProviderKind>().is_err());
    }
}
