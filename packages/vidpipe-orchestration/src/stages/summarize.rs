use crate::cache::LruCache;
use crate::error::{PipelineError, Result};
use crate::fingerprint;
use crate::stages::StageWorker;
use crate::task::TaskType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Content category used when picking a summarization model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    General,
    Technical,
    News,
    Entertainment,
}

/// Static description of an available model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: &'static str,
    pub max_tokens: u32,
    pub cost_per_1k: f64,
    pub tier: &'static str,
}

const MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "gpt-3.5-turbo",
        max_tokens: 4096,
        cost_per_1k: 0.0015,
        tier: "light",
    },
    ModelInfo {
        name: "gpt-4",
        max_tokens: 8192,
        cost_per_1k: 0.03,
        tier: "standard",
    },
    ModelInfo {
        name: "gpt-4-turbo",
        max_tokens: 128_000,
        cost_per_1k: 0.01,
        tier: "advanced",
    },
];

/// Picks the cheapest model that still fits the transcript, weighted by
/// content type. A user preference always wins but must name a known model.
#[derive(Debug, Clone, Default)]
pub struct ModelSelector;

impl ModelSelector {
    const SHORT_THRESHOLD: usize = 1000;
    const MEDIUM_THRESHOLD: usize = 5000;
    const LONG_THRESHOLD: usize = 10_000;

    pub fn new() -> Self {
        Self
    }

    pub fn select_model(
        &self,
        transcript: &str,
        content_type: ContentType,
        user_preference: Option<&str>,
    ) -> Result<&'static str> {
        if let Some(preference) = user_preference {
            let info = self.get_model_info(preference)?;
            info!(model = info.name, "using user-preferred model");
            return Ok(info.name);
        }

        let length = transcript.len();
        let model = match content_type {
            ContentType::General => self.select_general(length),
            ContentType::Technical => self.select_technical(length),
            ContentType::News => self.select_news(length),
            ContentType::Entertainment => self.select_entertainment(length),
        };
        Ok(model)
    }

    fn select_general(&self, length: usize) -> &'static str {
        if length < Self::SHORT_THRESHOLD {
            "gpt-3.5-turbo"
        } else if length < Self::MEDIUM_THRESHOLD {
            "gpt-4"
        } else {
            "gpt-4-turbo"
        }
    }

    fn select_technical(&self, length: usize) -> &'static str {
        if length < Self::SHORT_THRESHOLD {
            "gpt-4"
        } else {
            "gpt-4-turbo"
        }
    }

    fn select_news(&self, length: usize) -> &'static str {
        if length < Self::MEDIUM_THRESHOLD {
            "gpt-3.5-turbo"
        } else {
            "gpt-4"
        }
    }

    fn select_entertainment(&self, length: usize) -> &'static str {
        if length < Self::LONG_THRESHOLD {
            "gpt-3.5-turbo"
        } else {
            "gpt-4"
        }
    }

    pub fn get_model_info(&self, model_name: &str) -> Result<&'static ModelInfo> {
        MODELS
            .iter()
            .find(|info| info.name == model_name)
            .ok_or_else(|| {
                PipelineError::Summarization(format!("Unsupported model: {}", model_name))
            })
    }
}

/// Narrow interface the summarization stage consumes.
#[async_trait]
pub trait SummarizeBackend: Send + Sync {
    async fn complete(&self, transcript: &str, model: &str, max_length: usize) -> Result<String>;
}

/// Default back-end: a hosted chat-completion endpoint.
pub struct ChatApiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ChatApiBackend {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1/chat/completions";

    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            api_key,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_prompt(transcript: &str, max_length: usize) -> String {
        format!(
            "Summarize the following transcript. The summary should:\n\
             1. Be concise, at most {} characters\n\
             2. Keep the key information and main points\n\
             3. Use clear language\n\
             4. Avoid redundancy and repetition\n\n\
             Transcript:\n{}\n\nSummary:",
            max_length, transcript
        )
    }
}

#[async_trait]
impl SummarizeBackend for ChatApiBackend {
    async fn complete(&self, transcript: &str, model: &str, max_length: usize) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            PipelineError::Summarization("no API key configured".to_string())
        })?;

        let body = serde_json::json!({
            "model": model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a professional content summarization assistant. \
                                Produce concise, accurate summaries of the provided transcript.",
                },
                {
                    "role": "user",
                    "content": Self::build_prompt(transcript, max_length),
                },
            ],
            "temperature": 0.7,
            // Rough estimate: one token per four characters.
            "max_tokens": (max_length / 4).max(1),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Summarization(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Summarization(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Summarization(format!("bad response body: {}", e)))?;

        Ok(body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

/// SUMMARIZE stage: transcript → summary text.
#[derive(Clone)]
pub struct SummaryGenerator {
    cache: Option<Arc<LruCache<String>>>,
    selector: ModelSelector,
    backend: Arc<dyn SummarizeBackend>,
    max_length: usize,
}

impl SummaryGenerator {
    pub const DEFAULT_MAX_LENGTH: usize = 500;

    pub fn new(
        cache: Option<Arc<LruCache<String>>>,
        backend: Arc<dyn SummarizeBackend>,
    ) -> Self {
        Self {
            cache,
            selector: ModelSelector::new(),
            backend,
            max_length: Self::DEFAULT_MAX_LENGTH,
        }
    }

    pub fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    /// Generate a summary. The transcript must be non-blank; the model is
    /// selected automatically unless given. Summaries are cached per
    /// (transcript, model) pair.
    pub async fn generate(
        &self,
        transcript: &str,
        model: Option<&str>,
        content_type: ContentType,
        max_length: Option<usize>,
    ) -> Result<String> {
        if transcript.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "transcript must not be empty".to_string(),
            ));
        }

        let model = match model {
            Some(model) => self.selector.get_model_info(model)?.name,
            None => self
                .selector
                .select_model(transcript, content_type, None)?,
        };
        let max_length = max_length.unwrap_or(self.max_length);
        info!(model, "generating summary");

        let cache_key = fingerprint::summary_key(transcript, model);
        if let Some(cache) = &self.cache {
            if let Some(summary) = cache.get(&cache_key) {
                info!(model, "summary served from cache");
                return Ok(summary);
            }
        }

        let summary = self.backend.complete(transcript, model, max_length).await?;

        if summary.trim().is_empty() {
            return Err(PipelineError::Summarization(
                "back-end returned an empty summary".to_string(),
            ));
        }

        if let Some(cache) = &self.cache {
            cache.set(&cache_key, summary.clone());
        }

        info!(model, length = summary.len(), "summary generated");
        Ok(summary)
    }

    pub fn get_cached_summary(&self, transcript: &str, model: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        cache.get(&fingerprint::summary_key(transcript, model))
    }

    pub fn delete_cached_summary(&self, transcript: &str, model: &str) {
        if let Some(cache) = &self.cache {
            cache.delete(&fingerprint::summary_key(transcript, model));
            debug!(model, "cached summary deleted");
        }
    }
}

#[async_trait]
impl StageWorker for SummaryGenerator {
    fn task_type(&self) -> TaskType {
        TaskType::Summarize
    }

    async fn execute(&self, input: &str) -> Result<String> {
        self.generate(input, None, ContentType::General, None).await
    }

    fn is_cached(&self, input: &str) -> bool {
        self.get_cached(input).is_some()
    }

    fn get_cached(&self, input: &str) -> Option<String> {
        let model = self
            .selector
            .select_model(input, ContentType::General, None)
            .ok()?;
        self.get_cached_summary(input, model)
    }

    fn delete_cached(&self, input: &str) {
        if let Ok(model) = self.selector.select_model(input, ContentType::General, None) {
            self.delete_cached_summary(input, model);
        }
    }
}
