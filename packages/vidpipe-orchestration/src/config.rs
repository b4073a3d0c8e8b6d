use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline configuration.
///
/// All knobs are explicit and passed to `Orchestrator::new`; there is no
/// global configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of entries held by the shared artifact cache.
    pub cache_max_size: usize,
    /// Cache entry time-to-live. `None` means entries never expire.
    pub cache_ttl: Option<Duration>,
    /// Capacity of the task queue FIFO.
    pub queue_max_size: usize,
    /// Retries granted to each queue task on top of the initial attempt.
    pub task_max_retries: u32,
    /// Worker pool size. `None` selects the available hardware parallelism.
    pub max_workers: Option<usize>,
    /// Default wait applied by `WorkerPool::get_result` when the caller
    /// passes no timeout.
    pub worker_timeout: Duration,
    /// Directory receiving downloaded video files.
    pub videos_dir: PathBuf,
    /// Directory receiving extracted audio files.
    pub audio_dir: PathBuf,
    /// Directory receiving persisted result JSON documents.
    pub results_dir: PathBuf,
    /// Audio container format produced by the extraction stage.
    pub audio_format: String,
    /// Upper bound on a single download back-end invocation.
    pub download_timeout: Duration,
    /// Upper bound on a single media-tool invocation.
    pub extract_timeout: Duration,
    /// API key handed to the HTTP back-ends. The core never reads it.
    pub api_key: Option<String>,
    /// Whole-pipeline deadline. Accepted for compatibility; the core does
    /// not currently enforce it.
    pub processing_timeout: Duration,
    /// Retry backoff factor. Accepted for compatibility; the queue applies
    /// no backoff between attempts.
    pub retry_backoff: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            cache_max_size: 1000,
            cache_ttl: None,
            queue_max_size: 10_000,
            task_max_retries: 3,
            max_workers: None,
            worker_timeout: Duration::from_secs(300),
            videos_dir: data_dir.join("videos"),
            audio_dir: data_dir.join("audio"),
            results_dir: data_dir.join("results"),
            audio_format: "mp3".to_string(),
            download_timeout: Duration::from_secs(300),
            extract_timeout: Duration::from_secs(300),
            api_key: None,
            processing_timeout: Duration::from_secs(3600),
            retry_backoff: 2.0,
        }
    }
}

impl PipelineConfig {
    /// Effective worker pool size.
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(num_cpus::get)
    }
}
