//! Page content retrieval.
//!
//! [`ContentFetcher`] downloads each tab's page, reduces it to plain text,
//! repairs mis-encoded characters, and truncates the result so downstream
//! providers see a bounded prompt. Video pages are special-cased: captions
//! are preferred, and the tab title stands in when none exist.
//!
//! # Retry Strategy
//!
//! - Timeout, connection error, HTTP 429, HTTP 5xx → retry
//! - Other HTTP 4xx, unsupported content type, unrequestable URL → fail immediately
//! - Backoff: `base_backoff_ms`, then doubling per attempt
//!
//! A session fetch never fails as a whole: a tab whose fetch fails keeps
//! empty content and has `fetch_failed` set.

use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::models::Tab;
use crate::progress::{PipelineProgressEvent, ProgressReporter};
use crate::text::{collapse_whitespace, decode_entities, html_to_text, repair_mojibake, truncate_chars};

const HTML_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];
const PLAIN_TYPES: &[&str] = &["text/plain"];

pub struct ContentFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl ContentFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Fetch the cleaned text behind `url`.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with_title(url, "").await
    }

    /// Like [`fetch`](Self::fetch), with the tab title available as the
    /// fallback content for video pages without captions.
    pub async fn fetch_with_title(&self, url: &str, title: &str) -> Result<String, FetchError> {
        if let Some(video_id) = video_id(url) {
            return Ok(match self.fetch_transcript(&video_id).await {
                Some(transcript) => self.finish(&transcript),
                None => {
                    tracing::debug!(url, "no captions available, using title");
                    self.finish(title)
                }
            });
        }
        self.fetch_page(url).await
    }

    /// Fetch a standard page with retry and backoff.
    pub async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.base_backoff_ms << (attempt - 1).min(5);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.fetch_once(url).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() => {
                    tracing::debug!(url, attempt, error = %e, "transient fetch failure");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| FetchError::Request {
            url: url.to_string(),
            reason: "fetch failed after retries".to_string(),
        }))
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();

        let is_plain = PLAIN_TYPES.contains(&content_type.as_str());
        if !content_type.is_empty() && !is_plain && !HTML_TYPES.contains(&content_type.as_str()) {
            return Err(FetchError::UnsupportedContentType {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response.text().await.map_err(|e| request_error(url, e))?;
        let text = if is_plain {
            collapse_whitespace(&body)
        } else {
            html_to_text(&body)
        };
        Ok(self.finish(&text))
    }

    /// Caption text for a video, or `None` when the video has no captions
    /// or the lookup fails for any reason.
    pub async fn fetch_transcript(&self, video_id: &str) -> Option<String> {
        let url = format!(
            "{}/api/timedtext",
            self.config.transcript_base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .query(&[("lang", self.config.transcript_lang.as_str()), ("v", video_id)])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let xml = response.text().await.ok()?;
        let transcript = parse_transcript(&xml)?;
        if transcript.trim().is_empty() {
            None
        } else {
            Some(transcript)
        }
    }

    fn finish(&self, text: &str) -> String {
        let repaired = repair_mojibake(text);
        truncate_chars(&repaired, self.config.max_chars)
            .trim_end()
            .to_string()
    }

    /// Fill `content` for every tab with at most `concurrency` requests in
    /// flight. Results land in each tab's own slot, so order is unchanged.
    pub async fn fetch_session(&self, tabs: &mut [Tab], progress: &dyn ProgressReporter) {
        let total = tabs.len() as u64;
        let done = AtomicU64::new(0);

        let results: Vec<(usize, Result<String, FetchError>)> = stream::iter(
            tabs.iter()
                .enumerate()
                .map(|(i, tab)| (i, tab.url.clone(), tab.title.clone())),
        )
        .map(|(i, url, title)| {
            let done = &done;
            async move {
                let result = self.fetch_with_title(&url, &title).await;
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress.report(PipelineProgressEvent::Fetching { n, total });
                (i, result)
            }
        })
        .buffer_unordered(self.config.concurrency.max(1))
        .collect()
        .await;

        for (i, result) in results {
            let tab = &mut tabs[i];
            match result {
                Ok(text) => {
                    tab.content = Some(text);
                    tab.fetch_failed = false;
                }
                Err(e) => {
                    tracing::warn!("fetch failed for {}: {}", tab.url, e);
                    tab.content = None;
                    tab.fetch_failed = true;
                }
            }
        }
    }
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if e.is_builder() {
        FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Extract the video id from a YouTube watch, short-link, or shorts URL.
pub fn video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let id = match host {
        "youtu.be" => parsed.path_segments()?.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" => {
            let mut segments = parsed.path_segments()?;
            match segments.next() {
                Some("watch") => parsed
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("shorts") | Some("live") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    }?;

    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

/// Join the `<text>` elements of a timed-text caption document.
pub fn parse_transcript(xml: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut parts: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"text" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event() {
                        // Captions are escaped twice (`&amp;#39;`).
                        let once = te.unescape().unwrap_or_default();
                        let line = decode_entities(&once).replace('\n', " ");
                        if !line.trim().is_empty() {
                            parts.push(line.trim().to_string());
                        }
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }
    Some(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_ids_from_common_url_shapes() {
        assert_eq!(
            video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            video_id("https://m.youtube.com/watch?feature=share&v=abc_DEF-123").as_deref(),
            Some("abc_DEF-123")
        );
        assert_eq!(video_id("https://youtu.be/dQw4w9WgXcQ?t=10").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            video_id("https://www.youtube.com/shorts/xyz987").as_deref(),
            Some("xyz987")
        );
        assert_eq!(video_id("https://www.youtube.com/feed/subscriptions"), None);
        assert_eq!(video_id("https://example.com/watch?v=abc"), None);
        assert_eq!(video_id("not a url"), None);
    }

    #[test]
    fn transcript_text_is_joined_and_unescaped() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
            <text start="0.5" dur="2.1">We&amp;#39;re no strangers</text>
            <text start="2.6" dur="1.0">to love</text>
            <text start="3.6" dur="1.0"></text>
        </transcript>"#;
        assert_eq!(
            parse_transcript(xml).as_deref(),
            Some("We're no strangers to love")
        );
    }

    #[test]
    fn empty_transcript_document() {
        assert_eq!(parse_transcript("").as_deref(), Some(""));
    }
}
