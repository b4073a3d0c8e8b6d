use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a queue task.
///
/// Transitions: PENDING → RUNNING → (COMPLETED | FAILED). A failed attempt
/// with retries remaining goes RUNNING → PENDING with an incremented retry
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The four pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Download,
    Extract,
    Transcribe,
    Summarize,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Download => "download",
            TaskType::Extract => "extract",
            TaskType::Transcribe => "transcribe",
            TaskType::Summarize => "summarize",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stage-specific task input. Each variant carries the id of the pipeline
/// the task belongs to plus the single artifact the stage consumes.
///
/// The stage set is closed, so the payload is a sum type and queue
/// consumers dispatch with a plain `match`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskPayload {
    Download {
        parent_task_id: String,
        video_url: String,
    },
    Extract {
        parent_task_id: String,
        video_path: String,
    },
    Transcribe {
        parent_task_id: String,
        audio_path: String,
    },
    Summarize {
        parent_task_id: String,
        transcript: String,
    },
}

impl TaskPayload {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskPayload::Download { .. } => TaskType::Download,
            TaskPayload::Extract { .. } => TaskType::Extract,
            TaskPayload::Transcribe { .. } => TaskType::Transcribe,
            TaskPayload::Summarize { .. } => TaskType::Summarize,
        }
    }

    pub fn parent_task_id(&self) -> &str {
        match self {
            TaskPayload::Download { parent_task_id, .. }
            | TaskPayload::Extract { parent_task_id, .. }
            | TaskPayload::Transcribe { parent_task_id, .. }
            | TaskPayload::Summarize { parent_task_id, .. } => parent_task_id,
        }
    }
}

/// A unit of work owned by the task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub payload: TaskPayload,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl Task {
    pub fn new(task_id: String, payload: TaskPayload, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            payload,
            retry_count: 0,
            max_retries,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.payload.task_type()
    }
}

/// Queryable snapshot of a task's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            task_type: task.task_type(),
            status: task.status,
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            error_message: task.error_message.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}
