use crate::aggregator::{AggregatorStats, ResultAggregator};
use crate::cache::{CacheStats, LruCache};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::{ProcessingResult, ResultSummary, VideoMetadata};
use crate::pool::{PoolStats, WorkerPool};
use crate::queue::{QueueStats, TaskQueue};
use crate::stages::{
    AudioExtractor, ChatApiBackend, ContentType, FfmpegBackend, SummaryGenerator,
    TranscriptGenerator, VideoDownloader, WhisperApiBackend, YtDlpBackend,
};
use crate::task::{Task, TaskPayload, TaskStatus, TaskType};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// Lifecycle state of one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Processing,
    Completed,
    Failed,
}

/// Queryable snapshot of a pipeline's progress.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub task_id: String,
    pub video_url: String,
    pub status: PipelineState,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Seconds between start and end, present once the pipeline finished.
    pub processing_time: Option<f64>,
    /// Queue-task ids per stage, queue mode only.
    pub queue_tasks: HashMap<TaskType, String>,
}

/// Mutable per-pipeline bookkeeping.
struct PipelineMeta {
    video_url: String,
    status: PipelineState,
    start_time: DateTime<Utc>,
    started: Instant,
    end_time: Option<DateTime<Utc>>,
    elapsed: Option<f64>,
    error: Option<String>,
    queue_tasks: HashMap<TaskType, String>,
    // Stage artifacts accumulated in queue mode so the SUMMARIZE handler
    // can assemble the terminal result.
    video_path: Option<String>,
    audio_path: Option<String>,
    transcript: Option<String>,
}

impl PipelineMeta {
    fn new(video_url: String) -> Self {
        Self {
            video_url,
            status: PipelineState::Processing,
            start_time: Utc::now(),
            started: Instant::now(),
            end_time: None,
            elapsed: None,
            error: None,
            queue_tasks: HashMap::new(),
            video_path: None,
            audio_path: None,
            transcript: None,
        }
    }

    fn snapshot(&self, pipeline_id: &str) -> PipelineStatus {
        PipelineStatus {
            task_id: pipeline_id.to_string(),
            video_url: self.video_url.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            error: self.error.clone(),
            processing_time: self.elapsed,
            queue_tasks: self.queue_tasks.clone(),
        }
    }
}

struct OrchestratorInner {
    cache: Arc<LruCache<String>>,
    downloader: VideoDownloader,
    extractor: AudioExtractor,
    transcriber: TranscriptGenerator,
    summarizer: SummaryGenerator,
    queue: TaskQueue,
    pool: WorkerPool<()>,
    aggregator: ResultAggregator,
    results: DashMap<String, ProcessingResult>,
    task_metadata: DashMap<String, PipelineMeta>,
    cancel: CancellationToken,
}

/// Coordinates the four pipeline stages over a shared cache, a task queue
/// and a worker pool.
///
/// Cheap to clone; clones share all state, which is what the queue workers
/// and isolated batch jobs capture.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl Orchestrator {
    /// Build an orchestrator with the default command-line and HTTP
    /// back-ends.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let cache = Arc::new(LruCache::with_ttl(
            config.cache_max_size,
            config.cache_ttl,
        )?);

        let downloader = VideoDownloader::new(
            &config.videos_dir,
            Some(Arc::clone(&cache)),
            Arc::new(YtDlpBackend::new(config.download_timeout)),
        )?;
        let extractor = AudioExtractor::new(
            &config.audio_dir,
            Some(Arc::clone(&cache)),
            config.audio_format.clone(),
            Arc::new(FfmpegBackend::new(config.extract_timeout)),
        )?;
        let transcriber = TranscriptGenerator::new(
            Some(Arc::clone(&cache)),
            Arc::new(WhisperApiBackend::new(
                config.api_key.clone(),
                config.worker_timeout,
            )),
        );
        let summarizer = SummaryGenerator::new(
            Some(Arc::clone(&cache)),
            Arc::new(ChatApiBackend::new(
                config.api_key.clone(),
                config.worker_timeout,
            )),
        );

        Self::with_stages(config, cache, downloader, extractor, transcriber, summarizer)
    }

    /// Build an orchestrator around caller-provided stage workers. This is
    /// the seam batch tests use to plug in stub back-ends.
    pub fn with_stages(
        config: PipelineConfig,
        cache: Arc<LruCache<String>>,
        downloader: VideoDownloader,
        extractor: AudioExtractor,
        transcriber: TranscriptGenerator,
        summarizer: SummaryGenerator,
    ) -> Result<Self> {
        let queue =
            TaskQueue::with_max_retries(config.queue_max_size, config.task_max_retries)?;
        let pool = WorkerPool::new(config.max_workers, config.worker_timeout);
        let aggregator = ResultAggregator::new(&config.results_dir)?;

        info!("orchestrator initialized");
        Ok(Self {
            inner: Arc::new(OrchestratorInner {
                cache,
                downloader,
                extractor,
                transcriber,
                summarizer,
                queue,
                pool,
                aggregator,
                results: DashMap::new(),
                task_metadata: DashMap::new(),
                cancel: CancellationToken::new(),
            }),
        })
    }

    // ── Pipeline execution ──────────────────────────────────────────────

    /// Process one video URL. Returns the pipeline id.
    ///
    /// With `use_queue` the DOWNLOAD task is enqueued and this returns
    /// immediately; queue workers drive the remaining stages. Without it
    /// the four stages run inline and a stage failure escapes after the
    /// pipeline is marked failed.
    pub async fn process_video(&self, video_url: &str, use_queue: bool) -> Result<String> {
        let pipeline_id = Uuid::new_v4().to_string();
        info!(pipeline_id = %pipeline_id, video_url, "processing video");

        self.inner
            .task_metadata
            .insert(pipeline_id.clone(), PipelineMeta::new(video_url.to_string()));

        if use_queue {
            if let Err(e) = self.enqueue_pipeline(&pipeline_id, video_url) {
                error!(pipeline_id = %pipeline_id, "enqueue failed: {}", e);
                self.mark_pipeline_failed(&pipeline_id, &e.to_string());
                return Err(e);
            }
            info!(pipeline_id = %pipeline_id, "pipeline enqueued");
            return Ok(pipeline_id);
        }

        match self.run_pipeline(&pipeline_id, video_url).await {
            Ok(()) => Ok(pipeline_id),
            Err(e) => {
                error!(pipeline_id = %pipeline_id, "pipeline failed: {}", e);
                self.mark_pipeline_failed(&pipeline_id, &e.to_string());
                Err(e)
            }
        }
    }

    /// Run the four stages inline and hand the terminal result to the
    /// aggregator.
    async fn run_pipeline(&self, pipeline_id: &str, video_url: &str) -> Result<()> {
        info!(pipeline_id = %pipeline_id, "step 1: download");
        let video_path = self.download_stage(pipeline_id, video_url).await?;

        info!(pipeline_id = %pipeline_id, "step 2: extract audio");
        let audio_path = self.extract_stage(pipeline_id, &video_path).await?;

        info!(pipeline_id = %pipeline_id, "step 3: transcribe");
        let transcript = self.transcribe_stage(pipeline_id, &audio_path).await?;

        info!(pipeline_id = %pipeline_id, "step 4: summarize");
        let summary = self.summarize_stage(pipeline_id, &transcript).await?;

        self.finish_pipeline(
            pipeline_id,
            video_url,
            video_path,
            audio_path,
            transcript,
            summary,
        )
        .await
    }

    async fn finish_pipeline(
        &self,
        pipeline_id: &str,
        video_url: &str,
        video_path: String,
        audio_path: String,
        transcript: String,
        summary: String,
    ) -> Result<()> {
        let video_metadata = self.video_metadata(video_url).await;

        let elapsed = self
            .inner
            .task_metadata
            .get(pipeline_id)
            .map(|meta| meta.started.elapsed().as_secs_f64())
            .unwrap_or_default();

        let result = self.inner.aggregator.aggregate(
            pipeline_id,
            video_metadata,
            video_path,
            audio_path,
            transcript,
            summary,
            elapsed,
        );
        self.inner.aggregator.save(&result)?;
        self.inner
            .results
            .insert(pipeline_id.to_string(), result);

        if let Some(mut meta) = self.inner.task_metadata.get_mut(pipeline_id) {
            meta.status = PipelineState::Completed;
            meta.end_time = Some(Utc::now());
            meta.elapsed = Some(elapsed);
        }

        info!(
            pipeline_id = %pipeline_id,
            elapsed_secs = format!("{:.2}", elapsed),
            "pipeline completed"
        );
        Ok(())
    }

    fn mark_pipeline_failed(&self, pipeline_id: &str, error: &str) {
        if let Some(mut meta) = self.inner.task_metadata.get_mut(pipeline_id) {
            meta.status = PipelineState::Failed;
            meta.error = Some(error.to_string());
            meta.end_time = Some(Utc::now());
            meta.elapsed = Some(meta.started.elapsed().as_secs_f64());
        }
    }

    // ── Stage invocations (cache-first, so logs distinguish hits) ───────

    async fn download_stage(&self, pipeline_id: &str, video_url: &str) -> Result<String> {
        if let Some(cached) = self.inner.downloader.get_cached_file(video_url) {
            info!(pipeline_id = %pipeline_id, path = %cached, "video served from cache");
            return Ok(cached);
        }
        self.inner.downloader.download(video_url).await
    }

    async fn extract_stage(&self, pipeline_id: &str, video_path: &str) -> Result<String> {
        if let Some(cached) = self.inner.extractor.get_cached_audio(video_path) {
            info!(pipeline_id = %pipeline_id, path = %cached, "audio served from cache");
            return Ok(cached);
        }
        self.inner.extractor.extract(video_path).await
    }

    async fn transcribe_stage(&self, pipeline_id: &str, audio_path: &str) -> Result<String> {
        if let Some(cached) = self.inner.transcriber.get_cached_transcript(audio_path) {
            info!(pipeline_id = %pipeline_id, "transcript served from cache");
            return Ok(cached);
        }
        self.inner.transcriber.generate(audio_path, None).await
    }

    async fn summarize_stage(&self, pipeline_id: &str, transcript: &str) -> Result<String> {
        let model = self
            .inner
            .summarizer
            .selector()
            .select_model(transcript, ContentType::General, None)?;
        info!(pipeline_id = %pipeline_id, model, "model selected");

        if let Some(cached) = self.inner.summarizer.get_cached_summary(transcript, model) {
            info!(pipeline_id = %pipeline_id, "summary served from cache");
            return Ok(cached);
        }
        self.inner
            .summarizer
            .generate(transcript, Some(model), ContentType::General, None)
            .await
    }

    /// Best-effort metadata for a URL; degrades to url-only metadata with
    /// the detected platform.
    async fn video_metadata(&self, video_url: &str) -> VideoMetadata {
        let mut metadata = VideoMetadata::from_url(video_url);
        if let Some(info) = self.inner.downloader.get_video_info(video_url).await {
            metadata.title = info.title;
            metadata.duration = info.duration;
            metadata.upload_date = info.upload_date;
            metadata.channel = info.uploader;
        }
        metadata
    }

    // ── Batch operations ────────────────────────────────────────────────

    /// Process URLs sequentially. A failed URL yields `None` in the
    /// returned id list instead of aborting the batch.
    pub async fn process_batch(&self, video_urls: &[String]) -> Vec<Option<String>> {
        let mut pipeline_ids = Vec::with_capacity(video_urls.len());
        for video_url in video_urls {
            match self.process_video(video_url, false).await {
                Ok(pipeline_id) => pipeline_ids.push(Some(pipeline_id)),
                Err(e) => {
                    error!(video_url = %video_url, "batch item failed: {}", e);
                    pipeline_ids.push(None);
                }
            }
        }
        pipeline_ids
    }

    /// Submit one isolated synchronous pipeline per URL to the worker pool
    /// and wait for all of them.
    pub async fn process_batch_concurrent(&self, video_urls: &[String]) -> Vec<Option<String>> {
        info!(count = video_urls.len(), "processing batch concurrently");
        let mut pipeline_ids = Vec::with_capacity(video_urls.len());

        for video_url in video_urls {
            let pipeline_id = Uuid::new_v4().to_string();
            let this = self.clone();
            let url = video_url.clone();
            let job_pipeline_id = pipeline_id.clone();

            let submitted = self.inner.pool.submit(&pipeline_id, async move {
                this.process_video_isolated(&job_pipeline_id, &url).await;
                Ok(())
            });

            match submitted {
                Ok(()) => pipeline_ids.push(Some(pipeline_id)),
                Err(e) => {
                    error!(video_url = %video_url, "submit failed: {}", e);
                    pipeline_ids.push(None);
                }
            }
        }

        info!("waiting for concurrent batch");
        self.inner.pool.wait_all(None).await;
        pipeline_ids
    }

    /// Full synchronous pipeline run that never lets a failure escape the
    /// worker job: errors land in the pipeline metadata only, keeping
    /// sibling pipelines untouched.
    async fn process_video_isolated(&self, pipeline_id: &str, video_url: &str) {
        info!(pipeline_id = %pipeline_id, video_url, "isolated pipeline started");
        self.inner
            .task_metadata
            .insert(pipeline_id.to_string(), PipelineMeta::new(video_url.to_string()));

        if let Err(e) = self.run_pipeline(pipeline_id, video_url).await {
            error!(pipeline_id = %pipeline_id, "isolated pipeline failed: {}", e);
            self.mark_pipeline_failed(pipeline_id, &e.to_string());
        }
    }

    /// Enqueue every URL for asynchronous processing.
    pub async fn submit_batch_to_queue(&self, video_urls: &[String]) -> Vec<Option<String>> {
        info!(count = video_urls.len(), "submitting batch to queue");
        let mut pipeline_ids = Vec::with_capacity(video_urls.len());
        for video_url in video_urls {
            match self.process_video(video_url, true).await {
                Ok(pipeline_id) => pipeline_ids.push(Some(pipeline_id)),
                Err(e) => {
                    error!(video_url = %video_url, "enqueue failed: {}", e);
                    pipeline_ids.push(None);
                }
            }
        }
        pipeline_ids
    }

    // ── Queue mode ──────────────────────────────────────────────────────

    fn enqueue_pipeline(&self, pipeline_id: &str, video_url: &str) -> Result<String> {
        let task_id = self.inner.queue.enqueue(TaskPayload::Download {
            parent_task_id: pipeline_id.to_string(),
            video_url: video_url.to_string(),
        })?;

        self.record_queue_task(pipeline_id, TaskType::Download, &task_id);
        info!(pipeline_id = %pipeline_id, task_id = %task_id, "download task enqueued");
        Ok(task_id)
    }

    fn record_queue_task(&self, pipeline_id: &str, task_type: TaskType, task_id: &str) {
        if let Some(mut meta) = self.inner.task_metadata.get_mut(pipeline_id) {
            meta.queue_tasks.insert(task_type, task_id.to_string());
        }
    }

    /// Dispatch one dequeued task to its stage handler and report the
    /// outcome back to the queue. A handler error goes through
    /// `mark_failed`, which re-enqueues until retries are exhausted; a
    /// terminal failure also fails the parent pipeline.
    pub async fn process_queue_task(&self, task: Task) {
        let parent = task.payload.parent_task_id().to_string();

        let outcome = match &task.payload {
            TaskPayload::Download { video_url, .. } => {
                self.handle_download_task(&parent, video_url).await
            }
            TaskPayload::Extract { video_path, .. } => {
                self.handle_extract_task(&parent, video_path).await
            }
            TaskPayload::Transcribe { audio_path, .. } => {
                self.handle_transcribe_task(&parent, audio_path).await
            }
            TaskPayload::Summarize { transcript, .. } => {
                self.handle_summarize_task(&parent, transcript).await
            }
        };

        match outcome {
            Ok(()) => {
                self.inner.queue.mark_completed(&task.task_id);
            }
            Err(e) => {
                error!(
                    task_id = %task.task_id,
                    pipeline_id = %parent,
                    "queue task failed: {}", e
                );
                let status = self.inner.queue.mark_failed(&task.task_id, &e.to_string());
                if status == Some(TaskStatus::Failed) {
                    self.mark_pipeline_failed(&parent, &e.to_string());
                }
            }
        }
    }

    async fn handle_download_task(&self, pipeline_id: &str, video_url: &str) -> Result<()> {
        let video_path = self.download_stage(pipeline_id, video_url).await?;

        if let Some(mut meta) = self.inner.task_metadata.get_mut(pipeline_id) {
            meta.video_path = Some(video_path.clone());
        }

        let task_id = self.inner.queue.enqueue(TaskPayload::Extract {
            parent_task_id: pipeline_id.to_string(),
            video_path,
        })?;
        self.record_queue_task(pipeline_id, TaskType::Extract, &task_id);
        info!(pipeline_id = %pipeline_id, task_id = %task_id, "extract task enqueued");
        Ok(())
    }

    async fn handle_extract_task(&self, pipeline_id: &str, video_path: &str) -> Result<()> {
        let audio_path = self.extract_stage(pipeline_id, video_path).await?;

        if let Some(mut meta) = self.inner.task_metadata.get_mut(pipeline_id) {
            meta.audio_path = Some(audio_path.clone());
        }

        let task_id = self.inner.queue.enqueue(TaskPayload::Transcribe {
            parent_task_id: pipeline_id.to_string(),
            audio_path,
        })?;
        self.record_queue_task(pipeline_id, TaskType::Transcribe, &task_id);
        info!(pipeline_id = %pipeline_id, task_id = %task_id, "transcribe task enqueued");
        Ok(())
    }

    async fn handle_transcribe_task(&self, pipeline_id: &str, audio_path: &str) -> Result<()> {
        let transcript = self.transcribe_stage(pipeline_id, audio_path).await?;

        if let Some(mut meta) = self.inner.task_metadata.get_mut(pipeline_id) {
            meta.transcript = Some(transcript.clone());
        }

        let task_id = self.inner.queue.enqueue(TaskPayload::Summarize {
            parent_task_id: pipeline_id.to_string(),
            transcript,
        })?;
        self.record_queue_task(pipeline_id, TaskType::Summarize, &task_id);
        info!(pipeline_id = %pipeline_id, task_id = %task_id, "summarize task enqueued");
        Ok(())
    }

    async fn handle_summarize_task(&self, pipeline_id: &str, transcript: &str) -> Result<()> {
        let summary = self.summarize_stage(pipeline_id, transcript).await?;

        let (video_url, video_path, audio_path) = match self.inner.task_metadata.get(pipeline_id)
        {
            Some(meta) => (
                meta.video_url.clone(),
                meta.video_path.clone().unwrap_or_default(),
                meta.audio_path.clone().unwrap_or_default(),
            ),
            None => {
                return Err(PipelineError::Queue(format!(
                    "unknown pipeline: {}",
                    pipeline_id
                )))
            }
        };

        self.finish_pipeline(
            pipeline_id,
            &video_url,
            video_path,
            audio_path,
            transcript.to_string(),
            summary,
        )
        .await
    }

    /// Start `num_workers` long-running queue workers on the pool. Each
    /// loops dequeue → process until `shutdown` cancels them.
    pub fn start_queue_workers(&self, num_workers: usize) -> Vec<String> {
        let mut worker_ids = Vec::with_capacity(num_workers);
        info!(num_workers, "starting queue workers");

        for index in 0..num_workers {
            let worker_id = Uuid::new_v4().to_string();
            let this = self.clone();

            let submitted = self.inner.pool.submit(&worker_id, async move {
                this.queue_worker_loop(index).await;
                Ok(())
            });

            match submitted {
                Ok(()) => {
                    info!(worker = index, worker_id = %worker_id, "queue worker started");
                    worker_ids.push(worker_id);
                }
                Err(e) => error!(worker = index, "failed to start queue worker: {}", e),
            }
        }

        worker_ids
    }

    async fn queue_worker_loop(&self, worker_index: usize) {
        let cancel = self.inner.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(worker = worker_index, "queue worker stopping");
                    break;
                }
                task = self.inner.queue.dequeue(Duration::from_secs(1)) => {
                    if let Some(task) = task {
                        info!(worker = worker_index, task_id = %task.task_id, "worker picked task");
                        self.process_queue_task(task).await;
                    }
                }
            }
        }
    }

    // ── Result access ───────────────────────────────────────────────────

    pub fn get_result(&self, pipeline_id: &str) -> Option<ProcessingResult> {
        self.inner
            .results
            .get(pipeline_id)
            .map(|result| result.clone())
    }

    pub fn get_status(&self, pipeline_id: &str) -> Option<PipelineStatus> {
        self.inner
            .task_metadata
            .get(pipeline_id)
            .map(|meta| meta.snapshot(pipeline_id))
    }

    pub fn get_result_dict(&self, pipeline_id: &str) -> Option<serde_json::Value> {
        let result = self.get_result(pipeline_id)?;
        serde_json::to_value(&result).ok()
    }

    pub fn get_batch_results(
        &self,
        pipeline_ids: &[Option<String>],
    ) -> Vec<Option<serde_json::Value>> {
        pipeline_ids
            .iter()
            .map(|pipeline_id| {
                pipeline_id
                    .as_deref()
                    .and_then(|pipeline_id| self.get_result_dict(pipeline_id))
            })
            .collect()
    }

    pub fn get_all_results(&self) -> HashMap<String, serde_json::Value> {
        self.inner
            .results
            .iter()
            .filter_map(|entry| {
                serde_json::to_value(entry.value())
                    .ok()
                    .map(|value| (entry.key().clone(), value))
            })
            .collect()
    }

    pub fn get_result_summary(&self, pipeline_id: &str) -> Option<ResultSummary> {
        self.get_result(pipeline_id).map(|result| result.summary_view())
    }

    // ── JSON export ─────────────────────────────────────────────────────

    pub fn export_result_json(&self, pipeline_id: &str) -> Option<String> {
        let value = self.get_result_dict(pipeline_id)?;
        serde_json::to_string_pretty(&value).ok()
    }

    pub fn export_batch_results_json(&self, pipeline_ids: &[Option<String>]) -> Option<String> {
        let results = self.get_batch_results(pipeline_ids);
        serde_json::to_string_pretty(&results).ok()
    }

    pub fn save_result_to_file(&self, pipeline_id: &str, filepath: &std::path::Path) -> bool {
        let Some(json) = self.export_result_json(pipeline_id) else {
            error!(pipeline_id = %pipeline_id, "no result to export");
            return false;
        };

        match std::fs::write(filepath, json) {
            Ok(()) => {
                info!(pipeline_id = %pipeline_id, path = %filepath.display(), "result written");
                true
            }
            Err(e) => {
                error!(path = %filepath.display(), "failed to write result: {}", e);
                false
            }
        }
    }

    pub fn save_batch_results_to_file(
        &self,
        pipeline_ids: &[Option<String>],
        filepath: &std::path::Path,
    ) -> bool {
        let Some(json) = self.export_batch_results_json(pipeline_ids) else {
            error!("no batch results to export");
            return false;
        };

        match std::fs::write(filepath, json) {
            Ok(()) => {
                info!(path = %filepath.display(), "batch results written");
                true
            }
            Err(e) => {
                error!(path = %filepath.display(), "failed to write batch results: {}", e);
                false
            }
        }
    }

    // ── Introspection & shutdown ────────────────────────────────────────

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.inner.aggregator
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        self.inner.queue.get_stats()
    }

    pub fn get_pool_stats(&self) -> PoolStats {
        self.inner.pool.get_stats()
    }

    pub fn get_aggregator_stats(&self) -> AggregatorStats {
        self.inner.aggregator.get_stats()
    }

    /// Queue-task status passthrough, keyed by queue task id.
    pub fn get_queue_task_status(&self, task_id: &str) -> Option<crate::task::TaskSnapshot> {
        self.inner.queue.get_status(task_id)
    }

    /// Run `f` with this orchestrator and shut it down when `f` returns.
    pub async fn run_scoped<F, Fut, R>(self, f: F) -> R
    where
        F: FnOnce(Orchestrator) -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        let result = f(self.clone()).await;
        self.shutdown().await;
        result
    }

    /// Stop queue workers, drain the pool and drop queued tasks.
    pub async fn shutdown(&self) {
        info!("shutting down orchestrator");
        self.inner.cancel.cancel();
        self.inner.pool.shutdown(true).await;
        self.inner.queue.clear();
        info!("orchestrator shut down");
    }
}

// Tests for the orchestrator live in `tests/`, where the end-to-end
// scenarios exercise both execution modes through stub back-ends.
