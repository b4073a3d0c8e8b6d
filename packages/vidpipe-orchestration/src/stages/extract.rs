use crate::cache::LruCache;
use crate::error::{PipelineError, Result};
use crate::fingerprint;
use crate::stages::StageWorker;
use crate::task::TaskType;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Narrow interface the extraction stage consumes: pull the audio track of
/// `video_path` into `audio_path`.
#[async_trait]
pub trait ExtractBackend: Send + Sync {
    async fn extract(&self, video_path: &Path, audio_path: &Path) -> Result<()>;
}

/// Default back-end: the `ffmpeg` command-line tool, invoked with a
/// bounded timeout.
pub struct FfmpegBackend {
    timeout: Duration,
}

impl FfmpegBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ExtractBackend for FfmpegBackend {
    async fn extract(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new("ffmpeg")
                .arg("-i")
                .arg(video_path)
                .args(["-q:a", "0", "-map", "a", "-y"])
                .arg(audio_path)
                .output(),
        )
        .await
        .map_err(|_| PipelineError::Extraction("audio extraction timed out".to_string()))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::Extraction("ffmpeg is not installed or not on PATH".to_string())
            } else {
                PipelineError::extraction(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Extraction(format!(
                "ffmpeg exited with {}: {}",
                output.status, stderr
            )));
        }
        Ok(())
    }
}

/// EXTRACT stage: video file → audio file.
///
/// Output files are named by the hash of the source path, in the configured
/// audio format.
#[derive(Clone)]
pub struct AudioExtractor {
    output_dir: PathBuf,
    cache: Option<Arc<LruCache<String>>>,
    audio_format: String,
    backend: Arc<dyn ExtractBackend>,
}

impl AudioExtractor {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        cache: Option<Arc<LruCache<String>>>,
        audio_format: impl Into<String>,
        backend: Arc<dyn ExtractBackend>,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            cache,
            audio_format: audio_format.into(),
            backend,
        })
    }

    /// Extract the audio track, consulting the cache first.
    pub async fn extract(&self, video_path: &str) -> Result<String> {
        let cache_key = fingerprint::extract_key(video_path);

        if let Some(cache) = &self.cache {
            if let Some(audio_path) = cache.get(&cache_key) {
                info!(video_path, audio_path = %audio_path, "audio served from cache");
                return Ok(audio_path);
            }
        }

        let video_hash = format!("{:x}", md5::compute(video_path.as_bytes()));
        let audio_file = self
            .output_dir
            .join(format!("{}.{}", video_hash, self.audio_format));

        self.backend
            .extract(Path::new(video_path), &audio_file)
            .await?;

        let audio_path = audio_file.to_string_lossy().into_owned();
        if let Some(cache) = &self.cache {
            cache.set(&cache_key, audio_path.clone());
        }

        info!(video_path, audio_path = %audio_path, "audio extracted");
        Ok(audio_path)
    }

    pub fn get_cached_audio(&self, video_path: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        cache.get(&fingerprint::extract_key(video_path))
    }

    pub fn delete_cached_audio(&self, video_path: &str) {
        if let Some(cache) = &self.cache {
            cache.delete(&fingerprint::extract_key(video_path));
            debug!(video_path, "cached audio deleted");
        }
    }
}

#[async_trait]
impl StageWorker for AudioExtractor {
    fn task_type(&self) -> TaskType {
        TaskType::Extract
    }

    async fn execute(&self, input: &str) -> Result<String> {
        self.extract(input).await
    }

    fn is_cached(&self, input: &str) -> bool {
        self.get_cached_audio(input).is_some()
    }

    fn get_cached(&self, input: &str) -> Option<String> {
        self.get_cached_audio(input)
    }

    fn delete_cached(&self, input: &str) {
        self.delete_cached_audio(input);
    }
}
