/*
 * Vidpipe Orchestration - Video Processing Pipeline Core
 *
 * Drives video URLs through a fixed four-stage pipeline
 * (download → extract → transcribe → summarize) with:
 * - LRU+TTL artifact cache with deterministic fingerprints
 * - Bounded FIFO task queue with per-task retry
 * - Worker pool with handle-based result retrieval
 * - Synchronous and queue-driven execution modes
 * - JSON-persisted result aggregation and queries
 */

// Public modules
pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod stages;
pub mod task;

// Re-exports
pub use aggregator::{AggregatorStats, ResultAggregator};
pub use cache::{CacheStats, LruCache};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use models::{Platform, ProcessingResult, ResultSummary, VideoMetadata};
pub use orchestrator::{Orchestrator, PipelineState, PipelineStatus};
pub use pool::{PoolStats, WorkerPool};
pub use queue::{QueueStats, TaskQueue};
pub use stages::{
    AudioExtractor, ChatApiBackend, ContentType, DownloadBackend, ExtractBackend, FfmpegBackend,
    ModelInfo, ModelSelector, StageWorker, SummarizeBackend, SummaryGenerator, TranscribeBackend,
    TranscriptGenerator, VideoDownloader, VideoInfo, WhisperApiBackend, YtDlpBackend,
};
pub use task::{Task, TaskPayload, TaskSnapshot, TaskStatus, TaskType};
