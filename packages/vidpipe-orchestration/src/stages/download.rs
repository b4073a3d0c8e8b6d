use crate::cache::LruCache;
use crate::error::{PipelineError, Result};
use crate::fingerprint;
use crate::models::Platform;
use crate::stages::StageWorker;
use crate::task::TaskType;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Metadata returned by a download back-end probe.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    pub title: Option<String>,
    pub duration: Option<u64>,
    pub uploader: Option<String>,
    pub upload_date: Option<String>,
}

/// Narrow interface the download stage consumes. The back-end fetches one
/// URL into a file named `<stem>.<ext>` and can probe metadata without
/// downloading.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Download `url`, writing a file whose stem is `stem` inside
    /// `output_dir`. Returns the path of the downloaded file.
    async fn fetch(&self, url: &str, output_dir: &Path, stem: &str) -> Result<String>;

    /// Probe video metadata without downloading.
    async fn probe(&self, url: &str) -> Result<VideoInfo>;
}

/// Default back-end: the `yt-dlp` command-line tool.
pub struct YtDlpBackend {
    timeout: Duration,
}

impl YtDlpBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new("yt-dlp").args(args).output(),
        )
        .await
        .map_err(|_| PipelineError::Download("yt-dlp timed out".to_string()))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::Download("yt-dlp is not installed or not on PATH".to_string())
            } else {
                PipelineError::download(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Download(format!(
                "yt-dlp exited with {}: {}",
                output.status, stderr
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl DownloadBackend for YtDlpBackend {
    async fn fetch(&self, url: &str, output_dir: &Path, stem: &str) -> Result<String> {
        let template = output_dir.join(format!("{}.%(ext)s", stem));
        self.run(&[
            "--format",
            "best",
            "--output",
            &template.to_string_lossy(),
            url,
        ])
        .await?;

        find_by_stem(output_dir, stem).ok_or_else(|| {
            PipelineError::Download(format!("yt-dlp produced no file for {}", url))
        })
    }

    async fn probe(&self, url: &str) -> Result<VideoInfo> {
        let output = self
            .run(&["--dump-json", "--no-download", "--quiet", url])
            .await?;
        serde_json::from_slice(&output.stdout)
            .map_err(|e| PipelineError::Download(format!("yt-dlp metadata parse failed: {}", e)))
    }
}

/// Locate a file in `dir` whose stem equals `stem`, whatever the extension.
fn find_by_stem(dir: &Path, stem: &str) -> Option<String> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file()
            && path
                .file_stem()
                .map_or(false, |s| s.to_string_lossy() == stem)
        {
            return Some(path.to_string_lossy().into_owned());
        }
    }
    None
}

/// DOWNLOAD stage: URL → local video file.
///
/// Files land in `output_dir` under a stem derived from the URL hash, so a
/// URL downloaded once is served from disk afterwards. An optional shared
/// cache memoizes the resolved path as well.
#[derive(Clone)]
pub struct VideoDownloader {
    output_dir: PathBuf,
    cache: Option<Arc<LruCache<String>>>,
    backend: Arc<dyn DownloadBackend>,
}

impl VideoDownloader {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        cache: Option<Arc<LruCache<String>>>,
        backend: Arc<dyn DownloadBackend>,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            cache,
            backend,
        })
    }

    fn stem_for(url: &str) -> String {
        format!("{:x}", md5::compute(url.as_bytes()))
    }

    /// Download a video, detecting the platform first. Unsupported hosts
    /// fail before any network traffic.
    pub async fn download(&self, url: &str) -> Result<String> {
        let platform = Platform::detect(url)?;
        info!(url, platform = %platform, "starting download");

        let stem = Self::stem_for(url);
        let video_path = self.backend.fetch(url, &self.output_dir, &stem).await?;

        if let Some(cache) = &self.cache {
            cache.set(&fingerprint::download_key(url), video_path.clone());
        }

        info!(url, path = %video_path, "download finished");
        Ok(video_path)
    }

    /// Best-effort metadata probe; failures degrade to `None`.
    pub async fn get_video_info(&self, url: &str) -> Option<VideoInfo> {
        match self.backend.probe(url).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(url, "video info probe failed: {}", e);
                None
            }
        }
    }

    /// A URL counts as cached when the shared cache knows its path or any
    /// file with the URL-hash stem exists in the output directory.
    pub fn get_cached_file(&self, url: &str) -> Option<String> {
        if let Some(cache) = &self.cache {
            if let Some(path) = cache.get(&fingerprint::download_key(url)) {
                debug!(url, path = %path, "download served from cache");
                return Some(path);
            }
        }

        let path = find_by_stem(&self.output_dir, &Self::stem_for(url))?;
        debug!(url, path = %path, "download served from disk");
        if let Some(cache) = &self.cache {
            cache.set(&fingerprint::download_key(url), path.clone());
        }
        Some(path)
    }

    pub fn delete_cached_file(&self, url: &str) -> bool {
        if let Some(cache) = &self.cache {
            cache.delete(&fingerprint::download_key(url));
        }

        let mut deleted = false;
        while let Some(path) = find_by_stem(&self.output_dir, &Self::stem_for(url)) {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!(url, path = %path, "deleted cached download");
                    deleted = true;
                }
                Err(e) => {
                    error!(url, path = %path, "failed to delete cached download: {}", e);
                    break;
                }
            }
        }
        deleted
    }
}

#[async_trait]
impl StageWorker for VideoDownloader {
    fn task_type(&self) -> TaskType {
        TaskType::Download
    }

    async fn execute(&self, input: &str) -> Result<String> {
        if let Some(path) = self.get_cached_file(input) {
            return Ok(path);
        }
        self.download(input).await
    }

    fn is_cached(&self, input: &str) -> bool {
        self.get_cached_file(input).is_some()
    }

    fn get_cached(&self, input: &str) -> Option<String> {
        self.get_cached_file(input)
    }

    fn delete_cached(&self, input: &str) {
        self.delete_cached_file(input);
    }
}
