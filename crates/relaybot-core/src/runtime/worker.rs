//! Offload Worker - replays queued interactions in deferred mode with bounded retry.

use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::classifier::Classifier;
use super::dispatcher::{DispatchOutcome, Dispatcher};
use crate::channel::traits::Responder;
use crate::channel::types::OutboundPayload;
use crate::config::{AckPolicy, QueueSettings};
use crate::error::QueueResult;
use crate::offload::{Delivery, QueuedTask, TaskQueue};

/// Upper bound between two lease sweeps
const MAX_RECLAIM_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations allowed per task
    pub max_attempts: u32,
    pub ack_policy: AckPolicy,
    pub lease: Duration,
    pub idle_poll: Duration,
}

impl RetryPolicy {
    pub fn new(ack_policy: AckPolicy) -> Self {
        Self::from(&QueueSettings::new(ack_policy))
    }

    /// True when the attempt that just failed was the last one allowed
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) >= self.max_attempts
    }

    fn reclaim_interval(&self) -> Duration {
        (self.lease / 2).clamp(Duration::from_secs(1), MAX_RECLAIM_INTERVAL)
    }
}

impl From<&QueueSettings> for RetryPolicy {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            ack_policy: settings.ack_policy,
            lease: settings.lease(),
            idle_poll: settings.idle_poll(),
        }
    }
}

/// Final state of one processed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDisposition {
    Done(DispatchOutcome),
    /// Failed, back on the queue as attempt `attempt`
    Requeued { attempt: u32 },
    /// Failed on its last attempt
    Dropped { error: String },
}

pub struct OffloadWorker {
    queue: Arc<dyn TaskQueue>,
    classifier: Arc<Classifier>,
    dispatcher: Arc<Dispatcher>,
    responder: Arc<dyn Responder>,
    policy: RetryPolicy,
}

impl OffloadWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        classifier: Arc<Classifier>,
        dispatcher: Arc<Dispatcher>,
        responder: Arc<dyn Responder>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            classifier,
            dispatcher,
            responder,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Take one task off the queue and run it. `Ok(None)` when the queue is empty.
    pub async fn process_next(&self) -> QueueResult<Option<TaskDisposition>> {
        let Some(delivery) = self.queue.receive(self.policy.ack_policy).await? else {
            return Ok(None);
        };

        let task = &delivery.task;
        debug!(task_id = %task.id, attempt = task.attempt, "Received task");

        let disposition = match self.execute(task).await {
            Ok(outcome) => {
                self.queue.ack(&delivery).await?;
                info!(task_id = %task.id, outcome = ?outcome, "Task finished");
                TaskDisposition::Done(outcome)
            }
            Err(error) => self.fail(&delivery, error).await?,
        };
        Ok(Some(disposition))
    }

    /// Re-resolve, then run the full dispatcher path in deferred mode
    async fn execute(&self, task: &QueuedTask) -> Result<DispatchOutcome, String> {
        let interaction = self
            .classifier
            .reresolve(task.interaction.clone())
            .await
            .map_err(|e| e.to_string())?;
        self.dispatcher
            .handle(interaction.into_deferred())
            .await
            .map_err(|e| e.to_string())
    }

    async fn fail(&self, delivery: &Delivery, error: String) -> QueueResult<TaskDisposition> {
        let task = &delivery.task;
        if self.policy.exhausted(task.attempt) {
            error!(
                task_id = %task.id,
                attempts = task.attempt + 1,
                "Task failed, giving up: {}",
                error
            );
            self.queue.ack(delivery).await?;
            self.report_failure(task, &error).await;
            return Ok(TaskDisposition::Dropped { error });
        }

        let next = task.next_attempt();
        warn!(
            task_id = %task.id,
            attempt = next.attempt,
            "Task failed, requeueing: {}",
            error
        );
        self.queue.retry(delivery, &next).await?;
        Ok(TaskDisposition::Requeued {
            attempt: next.attempt,
        })
    }

    /// Tell the originating channel (and thread) that the task was dropped
    async fn report_failure(&self, task: &QueuedTask, error: &str) {
        let interaction = &task.interaction;
        let payload = OutboundPayload::new(
            &interaction.channel.id,
            format!("The task has failed: `{}`", error),
        )
        .with_thread_ts(interaction.thread_ts.clone());

        if let Err(e) = self.responder.post(&payload).await {
            warn!(task_id = %task.id, "Failed to report task failure: {:#}", e);
        }
    }

    async fn reclaim(&self) {
        if self.policy.ack_policy != AckPolicy::AfterProcess {
            return;
        }
        match self.queue.reclaim_expired(self.policy.lease).await {
            Ok(0) => {}
            Ok(count) => info!(count, "Redelivered expired tasks"),
            Err(e) => error!("Failed to reclaim expired tasks: {}", e),
        }
    }

    /// Process tasks one at a time until `shutdown` resolves.
    ///
    /// Shutdown is observed between tasks, never in the middle of one.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            ack_policy = %self.policy.ack_policy,
            max_attempts = self.policy.max_attempts,
            "Worker started"
        );

        self.reclaim().await;
        let mut last_reclaim = Instant::now();

        loop {
            if last_reclaim.elapsed() >= self.policy.reclaim_interval() {
                self.reclaim().await;
                last_reclaim = Instant::now();
            }

            let idle = match self.process_next().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    error!("Queue error: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = sleep(self.policy.idle_poll) => {}
                }
            } else if shutdown.as_mut().now_or_never().is_some() {
                break;
            }
        }

        info!("Worker stopped");
    }
}
