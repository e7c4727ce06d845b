//! Hosted and local LLM backends.
//!
//! All three backends send the same prompt and feed the model's free-form
//! answer through [`parse_response`]. A transport failure, a non-success
//! status, or a response body missing the expected fields is an error (the
//! categorizer moves on); a well-formed body whose text cannot be parsed
//! degrades to an empty classification instead.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::normalize::parse_response;
use super::{Classification, ClassifyProvider, ClassifyRequest};
use crate::config::RemoteProviderConfig;

const PROMPT_CONTENT_CHARS: usize = 4000;

/// The instruction sent to every LLM backend.
pub fn build_prompt(request: &ClassifyRequest) -> String {
    let content: String = request.text.chars().take(PROMPT_CONTENT_CHARS).collect();
    format!(
        "Classify the following web page.\n\
         Respond with exactly two lines and nothing else:\n\
         Category: <one short main category, e.g. Coding, Research, News, Shopping>\n\
         Tags: <up to 10 comma-separated lowercase keywords>\n\n\
         Title: {}\nURL: {}\n\nContent:\n{}",
        request.title, request.url, content
    )
}

fn env_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Send a prepared request and return the JSON body of a 2xx response.
/// Transport errors drop the request URL so nothing in it reaches logs.
async fn send_json(label: &str, request: reqwest::RequestBuilder) -> Result<serde_json::Value> {
    let response = request
        .header("Content-Type", "application/json")
        .send()
        .await
        .map_err(reqwest::Error::without_url)?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", label, status, body_text);
    }
    Ok(response.json().await.map_err(reqwest::Error::without_url)?)
}

fn classification_from_text(text: &str) -> Classification {
    let (category, tags) = parse_response(text);
    Classification { category, tags }
}

// ============ Gemini ============

/// Google Gemini via `generateContent`. Needs `GEMINI_API_KEY`.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub const ENV_KEY: &'static str = "GEMINI_API_KEY";
    pub const DEFAULT_MODEL: &'static str = "gemini-1.5-flash";
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    pub fn new(api_key: Option<String>, config: &RemoteProviderConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
        })
    }

    /// Read the key from the environment once, at construction.
    pub fn from_env(config: &RemoteProviderConfig, timeout: Duration) -> Result<Self> {
        Self::new(env_key(Self::ENV_KEY), config, timeout)
    }
}

#[async_trait]
impl ClassifyProvider for GeminiProvider {
    fn id(&self) -> &str {
        "gemini"
    }

    fn credential_env(&self) -> Option<&str> {
        Some(Self::ENV_KEY)
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<Classification> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("{} not set", Self::ENV_KEY);
        };
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": build_prompt(request) }] }],
        });

        let json = send_json(
            "Gemini",
            self.client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&body),
        )
        .await?;
        Ok(classification_from_text(gemini_text(&json)?))
    }
}

fn gemini_text(json: &serde_json::Value) -> Result<&str> {
    json.pointer("/candidates/0/content/parts/0/text")
        .and_then(|t| t.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidate text"))
}

// ============ Mistral ============

/// Mistral chat completions. Needs `MISTRAL_API_KEY`.
pub struct MistralProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl MistralProvider {
    pub const ENV_KEY: &'static str = "MISTRAL_API_KEY";
    pub const DEFAULT_MODEL: &'static str = "mistral-small-latest";
    pub const DEFAULT_BASE_URL: &'static str = "https://api.mistral.ai";

    pub fn new(api_key: Option<String>, config: &RemoteProviderConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn from_env(config: &RemoteProviderConfig, timeout: Duration) -> Result<Self> {
        Self::new(env_key(Self::ENV_KEY), config, timeout)
    }
}

#[async_trait]
impl ClassifyProvider for MistralProvider {
    fn id(&self) -> &str {
        "mistral"
    }

    fn credential_env(&self) -> Option<&str> {
        Some(Self::ENV_KEY)
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<Classification> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("{} not set", Self::ENV_KEY);
        };
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": build_prompt(request) }],
        });

        let json = send_json(
            "Mistral",
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body),
        )
        .await?;
        Ok(classification_from_text(mistral_text(&json)?))
    }
}

fn mistral_text(json: &serde_json::Value) -> Result<&str> {
    json.pointer("/choices/0/message/content")
        .and_then(|t| t.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid Mistral response: missing message content"))
}

// ============ Ollama ============

/// A local Ollama runtime (`POST /api/generate`). No credential.
pub struct OllamaProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OllamaProvider {
    pub const DEFAULT_MODEL: &'static str = "llama2";
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    pub fn new(config: &RemoteProviderConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl ClassifyProvider for OllamaProvider {
    fn id(&self) -> &str {
        "ollama"
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<Classification> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "prompt": build_prompt(request),
            "stream": false,
        });

        let json = send_json("Ollama", self.client.post(&url).json(&body)).await?;
        let text = json
            .get("response")
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))?;
        Ok(classification_from_text(text))
    }
}
