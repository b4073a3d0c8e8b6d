use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error taxonomy for the processing pipeline.
///
/// The enum itself is the catch-all "video processing error" supertype;
/// each variant is one failure kind.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Summarization failed: {0}")]
    Summarization(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Queue is full")]
    QueueFull,

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn download<E: std::fmt::Display>(e: E) -> Self {
        Self::Download(e.to_string())
    }

    pub fn extraction<E: std::fmt::Display>(e: E) -> Self {
        Self::Extraction(e.to_string())
    }

    pub fn transcription<E: std::fmt::Display>(e: E) -> Self {
        Self::Transcription(e.to_string())
    }

    pub fn summarization<E: std::fmt::Display>(e: E) -> Self {
        Self::Summarization(e.to_string())
    }

    pub fn cache<E: std::fmt::Display>(e: E) -> Self {
        Self::Cache(e.to_string())
    }

    pub fn queue<E: std::fmt::Display>(e: E) -> Self {
        Self::Queue(e.to_string())
    }

    pub fn pool<E: std::fmt::Display>(e: E) -> Self {
        Self::Pool(e.to_string())
    }

    /// True for errors raised by one of the four pipeline stages.
    pub fn is_stage_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Download(_)
                | PipelineError::Extraction(_)
                | PipelineError::Transcription(_)
                | PipelineError::Summarization(_)
        )
    }
}
