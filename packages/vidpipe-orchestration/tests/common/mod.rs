//! Shared stub back-ends for end-to-end pipeline tests.
//!
//! The stubs count invocations and move data the way the real back-ends
//! do: the download stub writes the URL into the video file, the extract
//! stub copies it into the audio file, so the transcription stub can make
//! per-URL decisions from the artifact alone.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vidpipe_orchestration::{
    AudioExtractor, DownloadBackend, ExtractBackend, LruCache, Orchestrator, PipelineConfig,
    PipelineError, Result, SummarizeBackend, SummaryGenerator, TranscribeBackend,
    TranscriptGenerator, VideoDownloader, VideoInfo,
};

pub struct StubDownload {
    pub calls: AtomicUsize,
    /// Fail this many initial fetches before succeeding.
    pub fail_times: usize,
}

#[async_trait]
impl DownloadBackend for StubDownload {
    async fn fetch(&self, url: &str, output_dir: &Path, stem: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_times {
            return Err(PipelineError::Download(format!(
                "stub network error #{}",
                call + 1
            )));
        }
        let path = output_dir.join(format!("{}.mp4", stem));
        std::fs::write(&path, url.as_bytes())?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn probe(&self, _url: &str) -> Result<VideoInfo> {
        Ok(VideoInfo {
            title: Some("Test Video".to_string()),
            duration: Some(120),
            uploader: Some("Test Channel".to_string()),
            upload_date: Some("20240101".to_string()),
        })
    }
}

pub struct StubExtract {
    pub calls: AtomicUsize,
    pub fail_always: bool,
}

#[async_trait]
impl ExtractBackend for StubExtract {
    async fn extract(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_always {
            return Err(PipelineError::Extraction("stub media tool error".to_string()));
        }
        std::fs::copy(video_path, audio_path)?;
        Ok(())
    }
}

pub struct StubTranscribe {
    pub calls: AtomicUsize,
    /// Fail for audio whose content contains this marker.
    pub poison: Option<String>,
}

#[async_trait]
impl TranscribeBackend for StubTranscribe {
    async fn transcribe(&self, audio_path: &Path, _language: Option<&str>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = std::fs::read_to_string(audio_path).unwrap_or_default();
        if let Some(poison) = &self.poison {
            if content.contains(poison) {
                return Err(PipelineError::Transcription(
                    "stub speech model error".to_string(),
                ));
            }
        }
        Ok("hello world".to_string())
    }
}

pub struct StubSummarize {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SummarizeBackend for StubSummarize {
    async fn complete(&self, transcript: &str, _model: &str, _max_length: usize) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!transcript.is_empty());
        Ok("hi".to_string())
    }
}

pub struct StubSet {
    pub download: Arc<StubDownload>,
    pub extract: Arc<StubExtract>,
    pub transcribe: Arc<StubTranscribe>,
    pub summarize: Arc<StubSummarize>,
}

impl Default for StubSet {
    fn default() -> Self {
        Self {
            download: Arc::new(StubDownload {
                calls: AtomicUsize::new(0),
                fail_times: 0,
            }),
            extract: Arc::new(StubExtract {
                calls: AtomicUsize::new(0),
                fail_always: false,
            }),
            transcribe: Arc::new(StubTranscribe {
                calls: AtomicUsize::new(0),
                poison: None,
            }),
            summarize: Arc::new(StubSummarize {
                calls: AtomicUsize::new(0),
            }),
        }
    }
}

pub fn test_config(root: &Path, max_retries: u32) -> PipelineConfig {
    PipelineConfig {
        videos_dir: root.join("videos"),
        audio_dir: root.join("audio"),
        results_dir: root.join("results"),
        task_max_retries: max_retries,
        max_workers: Some(4),
        worker_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

/// Orchestrator wired to the stub back-ends, storing everything under
/// `root`.
pub fn orchestrator_with_stubs(root: &Path, stubs: &StubSet, max_retries: u32) -> Orchestrator {
    init_tracing();
    let config = test_config(root, max_retries);
    let cache = Arc::new(LruCache::new(config.cache_max_size).unwrap());

    let downloader = VideoDownloader::new(
        &config.videos_dir,
        Some(Arc::clone(&cache)),
        Arc::clone(&stubs.download) as Arc<dyn DownloadBackend>,
    )
    .unwrap();
    let extractor = AudioExtractor::new(
        &config.audio_dir,
        Some(Arc::clone(&cache)),
        config.audio_format.clone(),
        Arc::clone(&stubs.extract) as Arc<dyn ExtractBackend>,
    )
    .unwrap();
    let transcriber = TranscriptGenerator::new(
        Some(Arc::clone(&cache)),
        Arc::clone(&stubs.transcribe) as Arc<dyn TranscribeBackend>,
    );
    let summarizer = SummaryGenerator::new(
        Some(Arc::clone(&cache)),
        Arc::clone(&stubs.summarize) as Arc<dyn SummarizeBackend>,
    );

    Orchestrator::with_stages(config, cache, downloader, extractor, transcriber, summarizer)
        .unwrap()
}

/// Test log capture driven by `RUST_LOG`; repeat calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `predicate` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[allow(dead_code)]
pub fn storage_root() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();
    (dir, path)
}
