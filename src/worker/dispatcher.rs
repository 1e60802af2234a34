//! Task dispatcher: hands accepted tasks to a bounded worker pool.
//!
//! A task id is claimed from the moment it is enqueued until its producer
//! returns, so at most one producer ever writes a given record.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tracing::{error, info, warn};

use super::producer::Producer;
use super::task::{TaskBody, TaskContext};
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::state::TaskId;
use crate::store::TaskStateStore;

/// Accepts a task for asynchronous execution.
///
/// Returns once the task is queued; execution failures only ever reach the
/// task's record.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn enqueue(&self, task_id: TaskId, payload: String) -> Result<(), DispatchError>;
}

struct Job {
    task_id: TaskId,
    payload: String,
}

/// In-process worker pool backed by a bounded queue.
pub struct LocalDispatcher {
    tx: mpsc::Sender<Job>,
    claimed: Arc<Mutex<HashSet<TaskId>>>,
    capacity: usize,
}

impl LocalDispatcher {
    /// Start the dispatch loop on the current runtime.
    pub fn spawn(
        config: &DispatchConfig,
        store: Arc<TaskStateStore>,
        body: Arc<dyn TaskBody>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let claimed = Arc::new(Mutex::new(HashSet::new()));

        info!(
            body = body.name(),
            max_parallel = config.max_parallel_tasks,
            queue_capacity = config.queue_capacity,
            "Starting task dispatcher"
        );

        tokio::spawn(dispatch_loop(
            rx,
            Arc::new(Semaphore::new(config.max_parallel_tasks)),
            Producer::new(store),
            body,
            claimed.clone(),
        ));

        Arc::new(Self {
            tx,
            claimed,
            capacity: config.queue_capacity,
        })
    }

    /// Number of tasks queued or running.
    pub async fn in_flight(&self) -> usize {
        self.claimed.lock().await.len()
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn enqueue(&self, task_id: TaskId, payload: String) -> Result<(), DispatchError> {
        let mut claimed = self.claimed.lock().await;
        if claimed.contains(&task_id) {
            warn!(task_id = %task_id, "Rejected duplicate dispatch");
            return Err(DispatchError::AlreadyDispatched {
                task_id: task_id.to_string(),
            });
        }

        let job = Job {
            task_id: task_id.clone(),
            payload,
        };
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })?;

        claimed.insert(task_id);
        Ok(())
    }
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<Job>,
    permits: Arc<Semaphore>,
    producer: Producer,
    body: Arc<dyn TaskBody>,
    claimed: Arc<Mutex<HashSet<TaskId>>>,
) {
    while let Some(job) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let producer = producer.clone();
        let body = body.clone();
        let claimed = claimed.clone();

        tokio::spawn(async move {
            let Job { task_id, payload } = job;
            let ctx = TaskContext {
                task_id: task_id.clone(),
            };
            match producer.run(&task_id, body.events(ctx, payload)).await {
                Ok(outcome) => info!(task_id = %task_id, %outcome, "Task finished"),
                Err(e) => error!(task_id = %task_id, error = %e, "Task failed on store error"),
            }
            drop(permit);
            claimed.lock().await.remove(&task_id);
        });
    }
    info!("Task dispatcher stopped");
}
