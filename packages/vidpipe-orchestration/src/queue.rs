use crate::error::{PipelineError, Result};
use crate::task::{Task, TaskPayload, TaskSnapshot, TaskStatus};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Queue statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queue_length: usize,
    pub max_size: usize,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub completed_count: u64,
    pub failed_count: u64,
}

struct QueueInner {
    tasks: HashMap<String, Task>,
    completed_count: u64,
    failed_count: u64,
}

/// Bounded FIFO task queue with status tracking and bounded retry.
///
/// The channel carries task ids in strict FIFO order and is the only wait
/// point; all task metadata lives in a mutex-guarded side table. Any number
/// of consumers may call `dequeue` concurrently.
pub struct TaskQueue {
    max_size: usize,
    max_retries: u32,
    tx: async_channel::Sender<String>,
    rx: async_channel::Receiver<String>,
    inner: Mutex<QueueInner>,
}

impl TaskQueue {
    pub fn new(max_size: usize) -> Result<Self> {
        Self::with_max_retries(max_size, 3)
    }

    pub fn with_max_retries(max_size: usize, max_retries: u32) -> Result<Self> {
        if max_size == 0 {
            return Err(PipelineError::Queue(
                "max_size must be greater than 0".to_string(),
            ));
        }

        let (tx, rx) = async_channel::bounded(max_size);
        Ok(Self {
            max_size,
            max_retries,
            tx,
            rx,
            inner: Mutex::new(QueueInner {
                tasks: HashMap::new(),
                completed_count: 0,
                failed_count: 0,
            }),
        })
    }

    /// Mint a task for `payload`, register it and push it onto the FIFO.
    ///
    /// Fails with `QueueFull` when the channel is at capacity.
    pub fn enqueue(&self, payload: TaskPayload) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        let task = Task::new(task_id.clone(), payload, self.max_retries);
        let task_type = task.task_type();

        // Register before pushing so a concurrent dequeue always finds the
        // task in the side table.
        self.inner.lock().tasks.insert(task_id.clone(), task);

        if let Err(e) = self.tx.try_send(task_id.clone()) {
            self.inner.lock().tasks.remove(&task_id);
            return match e {
                async_channel::TrySendError::Full(_) => Err(PipelineError::QueueFull),
                async_channel::TrySendError::Closed(_) => {
                    Err(PipelineError::Queue("queue channel closed".to_string()))
                }
            };
        }

        info!(task_id = %task_id, task_type = %task_type, "task enqueued");
        Ok(task_id)
    }

    /// Pop the next task, waiting up to `timeout`. Returns `None` when the
    /// timeout expires. The returned task has been transitioned to RUNNING.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Task> {
        let task_id = match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Ok(task_id)) => task_id,
            Ok(Err(_)) => return None,
            Err(_) => return None,
        };

        let mut inner = self.inner.lock();
        let task = match inner.tasks.get_mut(&task_id) {
            Some(task) => task,
            None => {
                // The queue was cleared between push and pop.
                debug!(task_id = %task_id, "dequeued id without task record");
                return None;
            }
        };

        task.status = TaskStatus::Running;
        task.updated_at = Utc::now();
        let task = task.clone();

        info!(task_id = %task_id, "task dequeued");
        Some(task)
    }

    /// RUNNING → COMPLETED.
    pub fn mark_completed(&self, task_id: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.tasks.get_mut(task_id) {
            Some(task) => {
                task.status = TaskStatus::Completed;
                task.updated_at = Utc::now();
                inner.completed_count += 1;
                info!(task_id = %task_id, "task completed");
                true
            }
            None => {
                warn!(task_id = %task_id, "mark_completed: unknown task");
                false
            }
        }
    }

    /// Record a failure. The retry counter is incremented on every call;
    /// the task is re-enqueued while `retry_count <= max_retries`, so a
    /// task granted R retries is handed to workers at most R + 1 times and
    /// a terminal failure leaves the counter at R + 1.
    ///
    /// Returns the status the task ended up in, or `None` for unknown ids.
    pub fn mark_failed(&self, task_id: &str, error_message: &str) -> Option<TaskStatus> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let task = match inner.tasks.get_mut(task_id) {
            Some(task) => task,
            None => {
                warn!(task_id = %task_id, "mark_failed: unknown task");
                return None;
            }
        };

        task.error_message = Some(error_message.to_string());
        task.updated_at = Utc::now();
        task.retry_count += 1;

        if task.retry_count <= task.max_retries {
            task.status = TaskStatus::Pending;
            info!(
                task_id = %task_id,
                retry = task.retry_count,
                max_retries = task.max_retries,
                "task scheduled for retry"
            );

            if let Err(e) = self.tx.try_send(task_id.to_string()) {
                error!(task_id = %task_id, "re-enqueue failed: {}", e);
                task.status = TaskStatus::Failed;
                inner.failed_count += 1;
                return Some(TaskStatus::Failed);
            }
            Some(TaskStatus::Pending)
        } else {
            task.status = TaskStatus::Failed;
            inner.failed_count += 1;
            error!(task_id = %task_id, "task failed: retries exhausted");
            Some(TaskStatus::Failed)
        }
    }

    pub fn get_status(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.inner.lock().tasks.get(task_id).map(TaskSnapshot::from)
    }

    pub fn get_queue_length(&self) -> usize {
        self.rx.len()
    }

    pub fn get_pending_count(&self) -> usize {
        self.inner
            .lock()
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Pending)
            .count()
    }

    pub fn get_stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        let count = |status: TaskStatus| {
            inner
                .tasks
                .values()
                .filter(|task| task.status == status)
                .count()
        };

        QueueStats {
            queue_length: self.rx.len(),
            max_size: self.max_size,
            total_tasks: inner.tasks.len(),
            pending_tasks: count(TaskStatus::Pending),
            running_tasks: count(TaskStatus::Running),
            completed_tasks: count(TaskStatus::Completed),
            failed_tasks: count(TaskStatus::Failed),
            completed_count: inner.completed_count,
            failed_count: inner.failed_count,
        }
    }

    /// Drain the FIFO and drop all task records and counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        while self.rx.try_recv().is_ok() {}
        inner.tasks.clear();
        inner.completed_count = 0;
        inner.failed_count = 0;
        info!("queue cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download_payload(parent: &str) -> TaskPayload {
        TaskPayload::Download {
            parent_task_id: parent.to_string(),
            video_url: "https://youtu.be/abc".to_string(),
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            TaskQueue::new(0),
            Err(PipelineError::Queue(_))
        ));
    }

    #[test]
    fn test_enqueue_full_queue() {
        let queue = TaskQueue::new(2).unwrap();
        queue.enqueue(download_payload("p1")).unwrap();
        queue.enqueue(download_payload("p2")).unwrap();

        let err = queue.enqueue(download_payload("p3")).unwrap_err();
        assert!(matches!(err, PipelineError::QueueFull));

        // The rejected task must leave no trace in the side table.
        assert_eq!(queue.get_stats().total_tasks, 2);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::new(10).unwrap();
        let mut enqueued = Vec::new();
        for i in 0..5 {
            enqueued.push(queue.enqueue(download_payload(&format!("p{}", i))).unwrap());
        }

        for expected in &enqueued {
            let task = queue.dequeue(Duration::from_millis(100)).await.unwrap();
            assert_eq!(&task.task_id, expected);
            assert_eq!(task.status, TaskStatus::Running);
        }
    }

    #[tokio::test]
    async fn test_dequeue_timeout_returns_none() {
        let queue = TaskQueue::new(10).unwrap();
        let task = queue.dequeue(Duration::from_millis(20)).await;
        assert!(task.is_none());
    }

    #[tokio::test]
    async fn test_mark_completed() {
        let queue = TaskQueue::new(10).unwrap();
        let task_id = queue.enqueue(download_payload("p1")).unwrap();
        queue.dequeue(Duration::from_millis(100)).await.unwrap();

        assert!(queue.mark_completed(&task_id));
        let snapshot = queue.get_status(&task_id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(queue.get_stats().completed_count, 1);
    }

    #[test]
    fn test_mark_completed_unknown_task() {
        let queue = TaskQueue::new(10).unwrap();
        assert!(!queue.mark_completed("nope"));
    }

    #[tokio::test]
    async fn test_failed_task_reenqueued_until_retries_exhausted() {
        let queue = TaskQueue::with_max_retries(10, 2).unwrap();
        let task_id = queue.enqueue(download_payload("p1")).unwrap();

        // Initial attempt plus two retries.
        for attempt in 0..3 {
            let task = queue.dequeue(Duration::from_millis(100)).await.unwrap();
            assert_eq!(task.task_id, task_id);
            assert_eq!(task.retry_count, attempt);
            let status = queue.mark_failed(&task_id, "boom").unwrap();
            if attempt < 2 {
                assert_eq!(status, TaskStatus::Pending);
            } else {
                assert_eq!(status, TaskStatus::Failed);
            }
        }

        // Nothing left to dequeue; terminal counter sits one past max.
        assert!(queue.dequeue(Duration::from_millis(20)).await.is_none());
        let snapshot = queue.get_status(&task_id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert_eq!(snapshot.retry_count, 3);
        assert_eq!(snapshot.error_message.as_deref(), Some("boom"));
        assert_eq!(queue.get_stats().failed_count, 1);
    }

    #[tokio::test]
    async fn test_stats_and_pending_count() {
        let queue = TaskQueue::new(10).unwrap();
        queue.enqueue(download_payload("p1")).unwrap();
        queue.enqueue(download_payload("p2")).unwrap();
        assert_eq!(queue.get_queue_length(), 2);
        assert_eq!(queue.get_pending_count(), 2);

        queue.dequeue(Duration::from_millis(100)).await.unwrap();
        let stats = queue.get_stats();
        assert_eq!(stats.queue_length, 1);
        assert_eq!(stats.pending_tasks, 1);
        assert_eq!(stats.running_tasks, 1);
        assert_eq!(stats.total_tasks, 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let queue = TaskQueue::new(10).unwrap();
        queue.enqueue(download_payload("p1")).unwrap();
        queue.clear();

        assert_eq!(queue.get_queue_length(), 0);
        assert_eq!(queue.get_stats().total_tasks, 0);
        assert!(queue.dequeue(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn test_multiple_consumers() {
        use std::sync::Arc;

        let queue = Arc::new(TaskQueue::new(100).unwrap());
        for i in 0..20 {
            queue.enqueue(download_payload(&format!("p{}", i))).unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut seen = 0;
                while let Some(task) = queue.dequeue(Duration::from_millis(50)).await {
                    queue.mark_completed(&task.task_id);
                    seen += 1;
                }
                seen
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 20);
        assert_eq!(queue.get_stats().completed_count, 20);
    }
}
