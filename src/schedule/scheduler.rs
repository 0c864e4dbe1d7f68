//! Delivery of pickup notices at their fire time.
//!
//! [`SchedulerAdapter`] fires immediately when the fire time is already due,
//! otherwise hands the job to a [`DelayedExecutor`]. When no executor is
//! configured or it refuses the job, an in-process timer is used instead.
//! Timers and the in-memory [`JobQueue`] both die with the process.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::sleep;
use ulid::Ulid;

use crate::core::outbox::{Outbound, Outbox};

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Notice time {0} has already passed")]
    PastDue(DateTime<Utc>),

    #[error("Delayed executor unavailable: {0}")]
    Unavailable(String),

    #[error("No async runtime available for the fallback timer")]
    NoRuntime,

    #[error("Failed to deliver notice: {0}")]
    Delivery(String),
}

/// What to do with a job whose fire time is not in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PastDuePolicy {
    #[default]
    FireNow,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Ulid);

impl JobId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A notice to post as a reply at `fire_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub id: JobId,
    pub fire_at: DateTime<Utc>,
    pub chat_id: i64,
    pub reply_to: i32,
    pub payload: String,
}

impl ScheduledJob {
    pub fn new(fire_at: DateTime<Utc>, chat_id: i64, reply_to: i32, payload: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            fire_at,
            chat_id,
            reply_to,
            payload: payload.into(),
        }
    }
}

async fn deliver(outbox: &dyn Outbox, job: &ScheduledJob) -> Result<(), ScheduleError> {
    let message = Outbound::reply(job.chat_id, job.reply_to, job.payload.clone()).silent();
    outbox
        .send(message)
        .await
        .map(|_| ())
        .map_err(|e| ScheduleError::Delivery(e.to_string()))
}

/// A backend that runs jobs later.
#[async_trait]
pub trait DelayedExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Accept a job or report the backend as unavailable.
    async fn enqueue(&self, job: ScheduledJob) -> Result<(), ScheduleError>;

    /// Remove a pending job. `false` if it was unknown or already ran.
    async fn cancel(&self, id: JobId) -> bool;
}

/// In-memory job queue drained by a polling worker.
pub struct JobQueue {
    jobs: Arc<Mutex<BTreeMap<(DateTime<Utc>, JobId), ScheduledJob>>>,
    running: Arc<RwLock<bool>>,
    tick: std::time::Duration,
}

impl JobQueue {
    pub fn new(tick: std::time::Duration) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(BTreeMap::new())),
            running: Arc::new(RwLock::new(false)),
            tick,
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Pop every job due at `now`, earliest first.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        let mut jobs = self.jobs.lock().await;
        let due_keys: Vec<_> = jobs
            .keys()
            .take_while(|(fire_at, _)| *fire_at <= now)
            .copied()
            .collect();
        due_keys.iter().filter_map(|key| jobs.remove(key)).collect()
    }

    /// Start the worker. Jobs are refused until this has been called.
    pub async fn start(self: &Arc<Self>, outbox: Arc<dyn Outbox>) -> JoinHandle<()> {
        *self.running.write().await = true;
        tracing::info!("Job queue worker started");

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if !*queue.running.read().await {
                    tracing::info!("Job queue worker stopping");
                    break;
                }

                for job in queue.take_due(Utc::now()).await {
                    tracing::debug!("Firing job {} for chat {}", job.id, job.chat_id);
                    if let Err(e) = deliver(outbox.as_ref(), &job).await {
                        tracing::error!("Job {} failed: {}", job.id, e);
                    }
                }

                sleep(queue.tick).await;
            }
        })
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        tracing::info!("Job queue worker stopped");
    }
}

#[async_trait]
impl DelayedExecutor for JobQueue {
    fn name(&self) -> &'static str {
        "job-queue"
    }

    async fn enqueue(&self, job: ScheduledJob) -> Result<(), ScheduleError> {
        if !self.is_running().await {
            return Err(ScheduleError::Unavailable(
                "job queue worker is not running".to_string(),
            ));
        }
        self.jobs.lock().await.insert((job.fire_at, job.id), job);
        Ok(())
    }

    async fn cancel(&self, id: JobId) -> bool {
        let mut jobs = self.jobs.lock().await;
        let key = jobs.keys().find(|(_, job_id)| *job_id == id).copied();
        key.and_then(|key| jobs.remove(&key)).is_some()
    }
}

/// Handle to an in-process timer. Cancelling after it fired is a no-op.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    pub id: JobId,
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Sleep until `job.fire_at` (measured from `now`) on the current runtime,
/// then deliver.
pub fn spawn_timer(
    job: ScheduledJob,
    outbox: Arc<dyn Outbox>,
    now: DateTime<Utc>,
) -> Result<TimerHandle, ScheduleError> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| ScheduleError::NoRuntime)?;
    let delay = (job.fire_at - now).to_std().unwrap_or_default();
    let id = job.id;

    let task = runtime.spawn(async move {
        sleep(delay).await;
        if let Err(e) = deliver(outbox.as_ref(), &job).await {
            tracing::error!("Timer {} failed: {}", job.id, e);
        }
    });

    Ok(TimerHandle {
        id,
        abort: task.abort_handle(),
    })
}

/// How a job ended up being handled.
#[derive(Debug, Clone)]
pub enum Scheduled {
    FiredNow,
    Queued { id: JobId, backend: &'static str },
    Timer(TimerHandle),
}

impl Scheduled {
    pub fn is_queued(&self) -> bool {
        matches!(self, Scheduled::Queued { .. })
    }
}

pub struct SchedulerAdapter {
    executor: Option<Arc<dyn DelayedExecutor>>,
    outbox: Arc<dyn Outbox>,
    min_delay: Duration,
    past_due: PastDuePolicy,
}

impl SchedulerAdapter {
    pub fn new(outbox: Arc<dyn Outbox>, min_delay: Duration, past_due: PastDuePolicy) -> Self {
        Self {
            executor: None,
            outbox,
            min_delay,
            past_due,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn DelayedExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub async fn schedule(&self, job: ScheduledJob, now: DateTime<Utc>) -> Result<Scheduled, ScheduleError> {
        if job.fire_at <= now + self.min_delay {
            return match self.past_due {
                PastDuePolicy::Reject => Err(ScheduleError::PastDue(job.fire_at)),
                PastDuePolicy::FireNow => {
                    deliver(self.outbox.as_ref(), &job).await?;
                    tracing::info!("Fired notice for chat {} immediately", job.chat_id);
                    Ok(Scheduled::FiredNow)
                }
            };
        }

        if let Some(executor) = &self.executor {
            let id = job.id;
            let fire_at = job.fire_at;
            match executor.enqueue(job.clone()).await {
                Ok(()) => {
                    tracing::info!("Queued job {} on {} for {}", id, executor.name(), fire_at);
                    return Ok(Scheduled::Queued {
                        id,
                        backend: executor.name(),
                    });
                }
                Err(e) => {
                    tracing::warn!("{} refused job {}: {}", executor.name(), id, e);
                }
            }
        }

        let handle = spawn_timer(job, Arc::clone(&self.outbox), now)?;
        tracing::warn!("Job {} held by an in-process timer; it will not survive a restart", handle.id);
        Ok(Scheduled::Timer(handle))
    }

    /// Cancel a pending job. Returns whether anything was cancelled.
    pub async fn cancel(&self, scheduled: &Scheduled) -> bool {
        match scheduled {
            Scheduled::FiredNow => false,
            Scheduled::Queued { id, .. } => match &self.executor {
                Some(executor) => executor.cancel(*id).await,
                None => false,
            },
            Scheduled::Timer(handle) => {
                let pending = !handle.is_finished();
                handle.cancel();
                pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outbox::testing::RecordingOutbox;

    fn adapter(outbox: Arc<RecordingOutbox>, policy: PastDuePolicy) -> SchedulerAdapter {
        SchedulerAdapter::new(outbox, Duration::seconds(2), policy)
    }

    #[tokio::test]
    async fn test_past_due_fires_now() {
        let outbox = Arc::new(RecordingOutbox::new());
        let scheduler = adapter(outbox.clone(), PastDuePolicy::FireNow);
        let now = Utc::now();

        let job = ScheduledJob::new(now - Duration::minutes(5), 7, 42, "Load will be available on AI soon!");
        let outcome = scheduler.schedule(job, now).await.unwrap();

        assert!(matches!(outcome, Scheduled::FiredNow));
        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reply_to, Some(42));
        assert!(sent[0].silent);
    }

    #[tokio::test]
    async fn test_past_due_rejected() {
        let outbox = Arc::new(RecordingOutbox::new());
        let scheduler = adapter(outbox.clone(), PastDuePolicy::Reject);
        let now = Utc::now();

        let job = ScheduledJob::new(now + Duration::seconds(1), 7, 42, "x");
        let err = scheduler.schedule(job, now).await.unwrap_err();

        assert!(matches!(err, ScheduleError::PastDue(_)));
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn test_enqueues_on_running_queue() {
        let outbox = Arc::new(RecordingOutbox::new());
        let queue = Arc::new(JobQueue::new(std::time::Duration::from_millis(20)));
        let worker = queue.start(outbox.clone()).await;
        let scheduler = adapter(outbox.clone(), PastDuePolicy::FireNow).with_executor(queue.clone());
        let now = Utc::now();

        let job = ScheduledJob::new(now + Duration::hours(3), 7, 42, "later");
        let outcome = scheduler.schedule(job, now).await.unwrap();

        assert!(outcome.is_queued());
        assert_eq!(queue.len().await, 1);
        assert!(scheduler.cancel(&outcome).await);
        assert_eq!(queue.len().await, 0);

        queue.stop().await;
        worker.await.unwrap();
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn test_queue_worker_fires_due_jobs() {
        let outbox = Arc::new(RecordingOutbox::new());
        let queue = Arc::new(JobQueue::new(std::time::Duration::from_millis(10)));
        let worker = queue.start(outbox.clone()).await;

        let job = ScheduledJob::new(Utc::now() + Duration::milliseconds(30), 7, 42, "soon");
        queue.enqueue(job).await.unwrap();

        sleep(std::time::Duration::from_millis(200)).await;
        queue.stop().await;
        worker.await.unwrap();

        assert_eq!(outbox.texts(), vec!["soon".to_string()]);
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn test_take_due_is_ordered() {
        let queue = JobQueue::new(std::time::Duration::from_secs(1));
        *queue.running.write().await = true;
        let now = Utc::now();

        queue.enqueue(ScheduledJob::new(now - Duration::minutes(1), 1, 1, "b")).await.unwrap();
        queue.enqueue(ScheduledJob::new(now - Duration::minutes(2), 1, 1, "a")).await.unwrap();
        queue.enqueue(ScheduledJob::new(now + Duration::minutes(2), 1, 1, "c")).await.unwrap();

        let due: Vec<String> = queue.take_due(now).await.into_iter().map(|j| j.payload).collect();
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_timer_when_queue_stopped() {
        let outbox = Arc::new(RecordingOutbox::new());
        let queue = Arc::new(JobQueue::new(std::time::Duration::from_millis(10)));
        let scheduler = SchedulerAdapter::new(outbox.clone(), Duration::zero(), PastDuePolicy::FireNow)
            .with_executor(queue.clone());
        let now = Utc::now();

        let job = ScheduledJob::new(now + Duration::milliseconds(50), 7, 42, "fallback");
        let outcome = scheduler.schedule(job, now).await.unwrap();
        assert!(matches!(outcome, Scheduled::Timer(_)));
        assert!(!outcome.is_queued());

        sleep(std::time::Duration::from_millis(300)).await;
        assert_eq!(outbox.texts(), vec!["fallback".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_timer_never_fires() {
        let outbox = Arc::new(RecordingOutbox::new());
        let scheduler = SchedulerAdapter::new(outbox.clone(), Duration::zero(), PastDuePolicy::FireNow);
        let now = Utc::now();

        let job = ScheduledJob::new(now + Duration::milliseconds(100), 7, 42, "cancelled");
        let outcome = scheduler.schedule(job, now).await.unwrap();
        assert!(scheduler.cancel(&outcome).await);

        sleep(std::time::Duration::from_millis(250)).await;
        assert!(outbox.sent().is_empty());
    }

    #[test]
    fn test_spawn_timer_without_runtime() {
        let outbox: Arc<dyn Outbox> = Arc::new(RecordingOutbox::new());
        let job = ScheduledJob::new(Utc::now() + Duration::hours(1), 7, 42, "x");
        assert!(matches!(
            spawn_timer(job, outbox, Utc::now()),
            Err(ScheduleError::NoRuntime)
        ));
    }

    #[test]
    fn test_past_due_policy_serde() {
        assert_eq!(serde_json::to_string(&PastDuePolicy::FireNow).unwrap(), "\"fire_now\"");
        let policy: PastDuePolicy = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(policy, PastDuePolicy::Reject);
    }
}
