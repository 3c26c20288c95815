//! Queue boundary for offloaded work
//!
//! [`TaskQueue`] is the at-least-once, FIFO delivery channel between the
//! listener and the workers. [`DurableQueue`] implements it on the redb store.

use async_trait::async_trait;
use relaybot_storage::{ClaimedEntry, TaskQueueStore};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::task::QueuedTask;
use crate::config::AckPolicy;
use crate::error::{QueueError, QueueResult};

/// A task handed to a worker, together with how it was taken off the queue
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub task: QueuedTask,
    pub policy: AckPolicy,
    /// Ownership of an `after_process` claim; stale once the lease is reclaimed
    pub claim: Option<u64>,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Publish a task; returns its id
    async fn enqueue(&self, task: &QueuedTask) -> QueueResult<String>;

    /// Re-establish the connection after a failed publish
    async fn reconnect(&self) -> QueueResult<()>;

    /// Take the oldest task, acknowledging it now (`before_process`) or
    /// holding it in flight until [`ack`](TaskQueue::ack) (`after_process`)
    async fn receive(&self, policy: AckPolicy) -> QueueResult<Option<Delivery>>;

    /// Processing finished (success or give-up). A stale claim is a no-op.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Put `next` back at the tail in place of `delivery`. A stale claim is a
    /// no-op: the task is already pending again or owned by another worker.
    async fn retry(&self, delivery: &Delivery, next: &QueuedTask) -> QueueResult<()>;

    /// Redeliver in-flight tasks claimed longer than `lease` ago
    async fn reclaim_expired(&self, lease: Duration) -> QueueResult<usize>;
}

/// [`TaskQueue`] backed by [`TaskQueueStore`]
pub struct DurableQueue {
    store: TaskQueueStore,
    lock_wait: Duration,
}

impl DurableQueue {
    pub fn open(path: impl AsRef<Path>, lock_wait: Duration) -> QueueResult<Self> {
        let store = TaskQueueStore::open(path, lock_wait).map_err(QueueError::Storage)?;
        info!(path = ?store.path(), "Opened durable queue");
        Ok(Self { store, lock_wait })
    }

    pub fn store(&self) -> &TaskQueueStore {
        &self.store
    }

    /// Run a store operation off the async runtime; the store may wait on the file lock
    async fn blocking<T, F>(&self, op: F) -> QueueResult<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskQueueStore) -> anyhow::Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?
            .map_err(QueueError::Storage)
    }

    async fn decode(&self, entry: ClaimedEntry, policy: AckPolicy) -> QueueResult<Delivery> {
        match QueuedTask::decode(&entry.data) {
            Ok(task) => Ok(Delivery {
                task,
                policy,
                claim: entry.claim,
            }),
            Err(e) => {
                error!(task_id = %entry.task_id, "Dropping undecodable queue entry: {}", e);
                if let Some(claim) = entry.claim {
                    let task_id = entry.task_id.clone();
                    self.blocking(move |store| store.complete(&task_id, claim))
                        .await?;
                }
                Err(QueueError::Codec(e))
            }
        }
    }
}

#[async_trait]
impl TaskQueue for DurableQueue {
    async fn enqueue(&self, task: &QueuedTask) -> QueueResult<String> {
        let data = task.encode()?;
        let task_id = task.id.clone();
        let id = task_id.clone();
        let seq = self
            .blocking(move |store| store.push(&task_id, &data))
            .await?;
        debug!(task_id = %id, seq, attempt = task.attempt, "Enqueued task");
        Ok(id)
    }

    /// Store operations reopen the file every time, so there is no connection
    /// to rebuild; this waits for the file lock up to twice as long as a
    /// regular operation and fails if the queue file still cannot be opened.
    async fn reconnect(&self) -> QueueResult<()> {
        let path = self.store.path().to_path_buf();
        let lock_wait = self.lock_wait.saturating_mul(2);
        tokio::task::spawn_blocking(move || TaskQueueStore::open(path, lock_wait))
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?
            .map_err(QueueError::Storage)?;
        Ok(())
    }

    async fn receive(&self, policy: AckPolicy) -> QueueResult<Option<Delivery>> {
        let entry = match policy {
            AckPolicy::BeforeProcess => self.blocking(|store| store.pop_front()).await?,
            AckPolicy::AfterProcess => {
                let now = chrono::Utc::now().timestamp_millis();
                self.blocking(move |store| store.claim_front(now)).await?
            }
        };

        match entry {
            Some(entry) => self.decode(entry, policy).await.map(Some),
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let Some(claim) = delivery.claim else {
            return Ok(());
        };
        let task_id = delivery.task.id.clone();
        let removed = self
            .blocking({
                let task_id = task_id.clone();
                move |store| store.complete(&task_id, claim)
            })
            .await?;
        if !removed {
            warn!(task_id = %task_id, "Lease expired before the task finished, ack ignored");
        }
        Ok(())
    }

    async fn retry(&self, delivery: &Delivery, next: &QueuedTask) -> QueueResult<()> {
        let Some(claim) = delivery.claim else {
            return self.enqueue(next).await.map(|_| ());
        };
        let data = next.encode()?;
        let task_id = next.id.clone();
        let released = self
            .blocking(move |store| store.release(&task_id, claim, &data))
            .await?;
        if released.is_none() {
            warn!(task_id = %next.id, "Lease expired before the task finished, retry ignored");
        }
        Ok(())
    }

    async fn reclaim_expired(&self, lease: Duration) -> QueueResult<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
        self.blocking(move |store| store.reclaim_expired(now, lease_ms))
            .await
    }
}

/// In-memory queue for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryQueue {
        pending: Mutex<VecDeque<QueuedTask>>,
        in_flight: Mutex<Vec<QueuedTask>>,
        failing_enqueues: AtomicUsize,
        reconnects: AtomicUsize,
        claims: AtomicUsize,
    }

    impl MemoryQueue {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `count` enqueue calls fail
        pub fn fail_next_enqueues(&self, count: usize) {
            self.failing_enqueues.store(count, Ordering::SeqCst);
        }

        pub fn reconnects(&self) -> usize {
            self.reconnects.load(Ordering::SeqCst)
        }

        pub async fn pending(&self) -> Vec<QueuedTask> {
            self.pending.lock().await.iter().cloned().collect()
        }

        pub async fn in_flight(&self) -> Vec<QueuedTask> {
            self.in_flight.lock().await.clone()
        }
    }

    #[async_trait]
    impl TaskQueue for MemoryQueue {
        async fn enqueue(&self, task: &QueuedTask) -> QueueResult<String> {
            let failing = self.failing_enqueues.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_enqueues.store(failing - 1, Ordering::SeqCst);
                return Err(QueueError::Unavailable("connection reset".to_string()));
            }
            self.pending.lock().await.push_back(task.clone());
            Ok(task.id.clone())
        }

        async fn reconnect(&self) -> QueueResult<()> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn receive(&self, policy: AckPolicy) -> QueueResult<Option<Delivery>> {
            let Some(task) = self.pending.lock().await.pop_front() else {
                return Ok(None);
            };
            let claim = if policy == AckPolicy::AfterProcess {
                self.in_flight.lock().await.push(task.clone());
                Some(self.claims.fetch_add(1, Ordering::SeqCst) as u64)
            } else {
                None
            };
            Ok(Some(Delivery {
                task,
                policy,
                claim,
            }))
        }

        async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
            self.in_flight
                .lock()
                .await
                .retain(|task| task.id != delivery.task.id);
            Ok(())
        }

        async fn retry(&self, delivery: &Delivery, next: &QueuedTask) -> QueueResult<()> {
            self.ack(delivery).await?;
            self.pending.lock().await.push_back(next.clone());
            Ok(())
        }

        async fn reclaim_expired(&self, _lease: Duration) -> QueueResult<usize> {
            Ok(0)
        }
    }
}
