pub mod download;
pub mod extract;
pub mod summarize;
pub mod transcribe;

pub use download::{DownloadBackend, VideoDownloader, VideoInfo, YtDlpBackend};
pub use extract::{AudioExtractor, ExtractBackend, FfmpegBackend};
pub use summarize::{
    ChatApiBackend, ContentType, ModelInfo, ModelSelector, SummarizeBackend, SummaryGenerator,
};
pub use transcribe::{TranscribeBackend, TranscriptGenerator, WhisperApiBackend};

use crate::error::Result;
use crate::pool::WorkerPool;
use crate::task::TaskType;
use async_trait::async_trait;
use std::collections::HashMap;

/// Uniform contract every pipeline stage implements.
///
/// A stage consults its cache before touching the expensive back-end:
/// `execute` returns the cached artifact on a hit, invokes the back-end on
/// a miss, and caches the output on success only. The cache-probe helpers
/// are no-ops for stages constructed without a cache.
#[async_trait]
pub trait StageWorker: Send + Sync {
    fn task_type(&self) -> TaskType;

    /// Run the stage on its single input artifact.
    async fn execute(&self, input: &str) -> Result<String>;

    fn is_cached(&self, input: &str) -> bool;

    fn get_cached(&self, input: &str) -> Option<String>;

    fn delete_cached(&self, input: &str);

    /// Fan `inputs` out over `pool`, one job per input. Failed inputs map
    /// to `None` instead of aborting the batch.
    async fn execute_concurrent(
        &self,
        inputs: &[String],
        pool: &WorkerPool<String>,
    ) -> HashMap<String, Option<String>>
    where
        Self: Clone + Sized + 'static,
    {
        let mut job_ids = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let job_id = format!("{}-{}", self.task_type(), index);
            let worker = self.clone();
            let job_input = input.clone();

            match pool.submit(&job_id, async move { worker.execute(&job_input).await }) {
                Ok(()) => job_ids.push((input.clone(), Some(job_id))),
                Err(e) => {
                    tracing::error!(input = %input, "concurrent submit failed: {}", e);
                    job_ids.push((input.clone(), None));
                }
            }
        }

        let mut results = HashMap::with_capacity(inputs.len());
        for (input, job_id) in job_ids {
            let output = match job_id {
                Some(job_id) => pool.get_result(&job_id, None).await,
                None => None,
            };
            results.insert(input, output);
        }
        results
    }
}
