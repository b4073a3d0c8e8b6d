use crate::error::{PipelineError, Result};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};

/// Observable state of a submitted job.
#[derive(Debug, Clone)]
enum JobState<T> {
    /// Waiting for a worker permit.
    Queued,
    Running,
    /// Finished; `None` when the job failed or panicked.
    Done(Option<T>),
    Cancelled,
}

struct JobHandle<T> {
    state_tx: Arc<watch::Sender<JobState<T>>>,
    state_rx: watch::Receiver<JobState<T>>,
    join: tokio::task::JoinHandle<()>,
}

struct PoolInner<T> {
    jobs: HashMap<String, JobHandle<T>>,
    submitted_count: u64,
    completed_count: u64,
    failed_count: u64,
}

/// Worker pool statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub max_workers: usize,
    pub total_tasks: usize,
    pub active_tasks: usize,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    pub cancelled_tasks: usize,
    pub submitted_count: u64,
    pub completed_count: u64,
    pub failed_count: u64,
    pub is_shutdown: bool,
}

/// Bounded worker set with handle-based result retrieval.
///
/// Jobs are tokio tasks gated on a semaphore of `max_workers` permits, so
/// at most `max_workers` run at once while the rest wait queued. The pool
/// owns every job handle; callers retrieve results by task id. A failed or
/// panicked job surfaces as a `None` result rather than an error.
pub struct WorkerPool<T> {
    max_workers: usize,
    default_timeout: Duration,
    semaphore: Arc<Semaphore>,
    is_shutdown: AtomicBool,
    inner: Arc<Mutex<PoolInner<T>>>,
}

impl<T: Clone + Send + Sync + 'static> WorkerPool<T> {
    /// `max_workers` of `None` selects the available hardware parallelism.
    pub fn new(max_workers: Option<usize>, default_timeout: Duration) -> Self {
        let max_workers = max_workers.unwrap_or_else(num_cpus::get).max(1);
        Self {
            max_workers,
            default_timeout,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            is_shutdown: AtomicBool::new(false),
            inner: Arc::new(Mutex::new(PoolInner {
                jobs: HashMap::new(),
                submitted_count: 0,
                completed_count: 0,
                failed_count: 0,
            })),
        }
    }

    /// Submit a job under `task_id`. Fails once the pool is shut down.
    pub fn submit<F>(&self, task_id: &str, fut: F) -> Result<()>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Err(PipelineError::Pool("pool is shut down".to_string()));
        }

        let (state_tx, state_rx) = watch::channel(JobState::Queued);
        let state_tx = Arc::new(state_tx);

        let semaphore = Arc::clone(&self.semaphore);
        let inner = Arc::clone(&self.inner);
        let job_tx = Arc::clone(&state_tx);
        let job_id = task_id.to_string();

        let join = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    job_tx.send_replace(JobState::Cancelled);
                    return;
                }
            };

            // Skip execution if the job was cancelled while queued.
            let started = job_tx.send_if_modified(|state| match state {
                JobState::Queued => {
                    *state = JobState::Running;
                    true
                }
                _ => false,
            });
            if !started {
                return;
            }

            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(value)) => {
                    inner.lock().completed_count += 1;
                    Some(value)
                }
                Ok(Err(e)) => {
                    warn!(task_id = %job_id, "job failed: {}", e);
                    inner.lock().failed_count += 1;
                    None
                }
                Err(_) => {
                    warn!(task_id = %job_id, "job panicked");
                    inner.lock().failed_count += 1;
                    None
                }
            };

            job_tx.send_replace(JobState::Done(outcome));
        });

        let mut inner = self.inner.lock();
        inner.jobs.insert(
            task_id.to_string(),
            JobHandle {
                state_tx,
                state_rx,
                join,
            },
        );
        inner.submitted_count += 1;

        info!(task_id = %task_id, "job submitted");
        Ok(())
    }

    fn state_rx(&self, task_id: &str) -> Option<watch::Receiver<JobState<T>>> {
        self.inner
            .lock()
            .jobs
            .get(task_id)
            .map(|job| job.state_rx.clone())
    }

    /// Wait up to `timeout` (the pool default when `None`) for the job's
    /// result. Returns `None` for unknown ids, timeouts, cancelled jobs and
    /// job failures.
    pub async fn get_result(&self, task_id: &str, timeout: Option<Duration>) -> Option<T> {
        let Some(mut rx) = self.state_rx(task_id) else {
            warn!(task_id = %task_id, "get_result: unknown task");
            return None;
        };
        let timeout = timeout.unwrap_or(self.default_timeout);

        let wait = async move {
            loop {
                {
                    let state = rx.borrow_and_update();
                    match &*state {
                        JobState::Done(value) => return value.clone(),
                        JobState::Cancelled => return None,
                        _ => {}
                    }
                }
                if rx.changed().await.is_err() {
                    let state = rx.borrow();
                    return match &*state {
                        JobState::Done(value) => value.clone(),
                        _ => None,
                    };
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.unwrap_or(None)
    }

    pub fn is_done(&self, task_id: &str) -> bool {
        match self.state_rx(task_id) {
            Some(rx) => matches!(&*rx.borrow(), JobState::Done(_) | JobState::Cancelled),
            None => false,
        }
    }

    /// Best-effort cancellation: only jobs still waiting for a permit can
    /// be cancelled.
    pub fn cancel(&self, task_id: &str) -> bool {
        let inner = self.inner.lock();
        let Some(job) = inner.jobs.get(task_id) else {
            return false;
        };

        let cancelled = job.state_tx.send_if_modified(|state| match state {
            JobState::Queued => {
                *state = JobState::Cancelled;
                true
            }
            _ => false,
        });

        if cancelled {
            job.join.abort();
            info!(task_id = %task_id, "job cancelled");
        }
        cancelled
    }

    /// Wait for every submitted job to reach a terminal state. Returns
    /// `false` when `timeout` expires first.
    pub async fn wait_all(&self, timeout: Option<Duration>) -> bool {
        let receivers: Vec<_> = {
            let inner = self.inner.lock();
            inner.jobs.values().map(|job| job.state_rx.clone()).collect()
        };

        let wait = async move {
            for mut rx in receivers {
                loop {
                    {
                        let state = rx.borrow_and_update();
                        if matches!(&*state, JobState::Done(_) | JobState::Cancelled) {
                            break;
                        }
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            }
        };

        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.is_ok(),
            None => {
                wait.await;
                true
            }
        }
    }

    pub fn get_active_count(&self) -> usize {
        self.inner
            .lock()
            .jobs
            .values()
            .filter(|job| matches!(&*job.state_rx.borrow(), JobState::Running))
            .count()
    }

    pub fn get_pending_count(&self) -> usize {
        self.inner
            .lock()
            .jobs
            .values()
            .filter(|job| matches!(&*job.state_rx.borrow(), JobState::Queued))
            .count()
    }

    pub fn get_stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        let count = |pred: fn(&JobState<T>) -> bool| {
            inner
                .jobs
                .values()
                .filter(|job| pred(&job.state_rx.borrow()))
                .count()
        };

        PoolStats {
            max_workers: self.max_workers,
            total_tasks: inner.jobs.len(),
            active_tasks: count(|state| matches!(state, JobState::Running)),
            pending_tasks: count(|state| matches!(state, JobState::Queued)),
            completed_tasks: count(|state| matches!(state, JobState::Done(_))),
            cancelled_tasks: count(|state| matches!(state, JobState::Cancelled)),
            submitted_count: inner.submitted_count,
            completed_count: inner.completed_count,
            failed_count: inner.failed_count,
            is_shutdown: self.is_shutdown.load(Ordering::SeqCst),
        }
    }

    /// Run `f` against a fresh pool and shut the pool down (waiting for
    /// all jobs) when `f` returns.
    pub async fn scoped<F, Fut, R>(
        max_workers: Option<usize>,
        default_timeout: Duration,
        f: F,
    ) -> R
    where
        F: FnOnce(Arc<WorkerPool<T>>) -> Fut,
        Fut: Future<Output = R>,
    {
        let pool = Arc::new(Self::new(max_workers, default_timeout));
        let result = f(Arc::clone(&pool)).await;
        pool.shutdown(true).await;
        result
    }

    /// Refuse further submissions; with `wait`, also drain in-flight and
    /// queued jobs to completion.
    pub async fn shutdown(&self, wait: bool) {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            warn!("pool already shut down");
            return;
        }

        if wait {
            self.wait_all(None).await;
        }
        info!("pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max_workers: usize) -> WorkerPool<String> {
        WorkerPool::new(Some(max_workers), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_submit_and_get_result() {
        let pool = pool(2);
        pool.submit("t1", async { Ok("done".to_string()) }).unwrap();

        let result = pool.get_result("t1", None).await;
        assert_eq!(result, Some("done".to_string()));
        assert!(pool.is_done("t1"));
    }

    #[tokio::test]
    async fn test_failed_job_yields_none() {
        let pool = pool(2);
        pool.submit("t1", async {
            Err(PipelineError::Download("no such video".to_string()))
        })
        .unwrap();

        assert_eq!(pool.get_result("t1", None).await, None);
        assert_eq!(pool.get_stats().failed_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_task_yields_none() {
        let pool = pool(2);
        assert_eq!(pool.get_result("missing", None).await, None);
        assert!(!pool.is_done("missing"));
    }

    #[tokio::test]
    async fn test_get_result_timeout() {
        let pool = pool(1);
        pool.submit("slow", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("late".to_string())
        })
        .unwrap();

        let result = pool
            .get_result("slow", Some(Duration::from_millis(30)))
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let pool = pool(2);
        pool.shutdown(true).await;

        let err = pool.submit("t1", async { Ok("x".to_string()) }).unwrap_err();
        assert!(matches!(err, PipelineError::Pool(_)));
        assert!(pool.get_stats().is_shutdown);
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let pool = pool(1);
        pool.submit("blocker", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("first".to_string())
        })
        .unwrap();
        // Give the blocker the only permit.
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.submit("queued", async { Ok("second".to_string()) })
            .unwrap();

        assert!(pool.cancel("queued"));
        assert_eq!(pool.get_result("queued", None).await, None);

        // A running job cannot be cancelled.
        assert!(!pool.cancel("blocker"));
        assert_eq!(
            pool.get_result("blocker", None).await,
            Some("first".to_string())
        );
    }

    #[tokio::test]
    async fn test_worker_bound_respected() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let pool = pool(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(&format!("t{}", i), async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok("ok".to_string())
            })
            .unwrap();
        }

        assert!(pool.wait_all(Some(Duration::from_secs(5))).await);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.get_stats().completed_count, 6);
    }

    #[tokio::test]
    async fn test_wait_all_timeout() {
        let pool = pool(1);
        pool.submit("slow", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("late".to_string())
        })
        .unwrap();

        assert!(!pool.wait_all(Some(Duration::from_millis(30))).await);
    }

    #[tokio::test]
    async fn test_scoped_pool_shuts_down_on_exit() {
        let result = WorkerPool::<String>::scoped(Some(2), Duration::from_secs(5), |pool| {
            let pool = Arc::clone(&pool);
            async move {
                pool.submit("t1", async { Ok("done".to_string()) }).unwrap();
                pool.get_result("t1", None).await
            }
        })
        .await;

        assert_eq!(result, Some("done".to_string()));
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let pool = pool(1);
        pool.submit("a", async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok("a".to_string())
        })
        .unwrap();
        pool.submit("b", async { Ok("b".to_string()) }).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stats = pool.get_stats();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.submitted_count, 2);
        assert_eq!(stats.active_tasks, 1);
        assert_eq!(stats.pending_tasks, 1);

        pool.wait_all(None).await;
        let stats = pool.get_stats();
        assert_eq!(stats.completed_tasks, 2);
        assert_eq!(stats.completed_count, 2);
    }
}
