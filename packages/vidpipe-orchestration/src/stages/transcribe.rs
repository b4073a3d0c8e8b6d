use crate::cache::LruCache;
use crate::error::{PipelineError, Result};
use crate::fingerprint;
use crate::stages::StageWorker;
use crate::task::TaskType;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Narrow interface the transcription stage consumes.
#[async_trait]
pub trait TranscribeBackend: Send + Sync {
    async fn transcribe(&self, audio_path: &Path, language: Option<&str>) -> Result<String>;
}

/// Default back-end: the hosted Whisper transcription endpoint.
pub struct WhisperApiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl WhisperApiBackend {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1/audio/transcriptions";

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
}

#[async_trait]
impl TranscribeBackend for WhisperApiBackend {
    async fn transcribe(&self, audio_path: &Path, language: Option<&str>) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            PipelineError::Transcription("no API key configured".to_string())
        })?;

        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| PipelineError::Transcription(format!("cannot read audio file: {}", e)))?;

        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let mut form = reqwest::multipart::Form::new()
            .text("model", "whisper-1")
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Transcription(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Transcription(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Transcription(format!("bad response body: {}", e)))?;

        Ok(body["text"].as_str().unwrap_or_default().to_string())
    }
}

/// TRANSCRIBE stage: audio file → transcript text.
#[derive(Clone)]
pub struct TranscriptGenerator {
    cache: Option<Arc<LruCache<String>>>,
    backend: Arc<dyn TranscribeBackend>,
}

impl TranscriptGenerator {
    pub fn new(
        cache: Option<Arc<LruCache<String>>>,
        backend: Arc<dyn TranscribeBackend>,
    ) -> Self {
        Self { cache, backend }
    }

    /// Generate a transcript, consulting the cache first. An empty
    /// back-end response is a transcription error.
    pub async fn generate(&self, audio_path: &str, language: Option<&str>) -> Result<String> {
        let cache_key = fingerprint::transcript_key(audio_path);

        if let Some(cache) = &self.cache {
            if let Some(transcript) = cache.get(&cache_key) {
                info!(audio_path, "transcript served from cache");
                return Ok(transcript);
            }
        }

        let transcript = self
            .backend
            .transcribe(Path::new(audio_path), language)
            .await?;

        if transcript.trim().is_empty() {
            return Err(PipelineError::Transcription(
                "back-end returned an empty transcript".to_string(),
            ));
        }

        if let Some(cache) = &self.cache {
            cache.set(&cache_key, transcript.clone());
        }

        info!(audio_path, length = transcript.len(), "transcript generated");
        Ok(transcript)
    }

    pub fn get_cached_transcript(&self, audio_path: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        cache.get(&fingerprint::transcript_key(audio_path))
    }

    pub fn delete_cached_transcript(&self, audio_path: &str) {
        if let Some(cache) = &self.cache {
            cache.delete(&fingerprint::transcript_key(audio_path));
            debug!(audio_path, "cached transcript deleted");
        }
    }
}

#[async_trait]
impl StageWorker for TranscriptGenerator {
    fn task_type(&self) -> TaskType {
        TaskType::Transcribe
    }

    async fn execute(&self, input: &str) -> Result<String> {
        self.generate(input, None).await
    }

    fn is_cached(&self, input: &str) -> bool {
        self.get_cached_transcript(input).is_some()
    }

    fn get_cached(&self, input: &str) -> Option<String> {
        self.get_cached_transcript(input)
    }

    fn delete_cached(&self, input: &str) {
        self.delete_cached_transcript(input);
    }
}
