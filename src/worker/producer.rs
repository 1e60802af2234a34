//! Producer loop. Drains a task's event stream into its record.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use super::task::EventStream;
use crate::error::StoreError;
use crate::state::{StateEvent, TaskId, TaskStatus};
use crate::store::TaskStateStore;

/// How a producer run ended. `events` counts the events written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerOutcome {
    /// The stream ran out.
    Completed { events: usize },
    /// The stream ran out and the last event written was `status: error`.
    Failed { events: usize },
    /// The record expired or vanished; nothing more was written.
    Abandoned { events: usize },
    /// A cancellation was requested; `status: cancelled` was written.
    Cancelled { events: usize },
    /// The record already held a terminal status. Nothing was written.
    Skipped,
}

impl std::fmt::Display for ProducerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed { events } => write!(f, "completed ({events} events)"),
            Self::Failed { events } => write!(f, "failed ({events} events)"),
            Self::Abandoned { events } => write!(f, "abandoned ({events} events)"),
            Self::Cancelled { events } => write!(f, "cancelled ({events} events)"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// The single writer of one task's record.
#[derive(Clone)]
pub struct Producer {
    store: Arc<TaskStateStore>,
}

impl Producer {
    pub fn new(store: Arc<TaskStateStore>) -> Self {
        Self { store }
    }

    /// Persist every event of `events` in order, stopping as soon as an
    /// update reports the record gone.
    pub async fn run(
        &self,
        task_id: &TaskId,
        mut events: EventStream,
    ) -> Result<ProducerOutcome, StoreError> {
        match self.store.read(task_id).await? {
            None => {
                info!(task_id = %task_id, "Record gone before start, abandoning task");
                return Ok(ProducerOutcome::Abandoned { events: 0 });
            }
            Some(record) if record.is_terminal() => {
                warn!(
                    task_id = %task_id,
                    status = %record.current.content,
                    "Record already finished, skipping duplicate run"
                );
                return Ok(ProducerOutcome::Skipped);
            }
            Some(_) => {}
        }

        let mut written = 0;
        let mut last_status = None;

        while let Some(event) = events.next().await {
            if self.store.is_cancel_requested(task_id).await? {
                let stored = self
                    .store
                    .update(task_id, StateEvent::status(TaskStatus::Cancelled))
                    .await?;
                if !stored {
                    info!(
                        task_id = %task_id,
                        events = written,
                        "Record expired before cancellation, abandoning task"
                    );
                    return Ok(ProducerOutcome::Abandoned { events: written });
                }
                written += 1;
                info!(task_id = %task_id, events = written, "Task cancelled");
                return Ok(ProducerOutcome::Cancelled { events: written });
            }

            let status = event.as_status();
            if !self.store.update(task_id, event).await? {
                info!(
                    task_id = %task_id,
                    events = written,
                    "Record expired, abandoning task"
                );
                return Ok(ProducerOutcome::Abandoned { events: written });
            }
            written += 1;
            last_status = status;
            debug!(task_id = %task_id, events = written, "Event persisted");
        }

        if last_status == Some(TaskStatus::Error) {
            Ok(ProducerOutcome::Failed { events: written })
        } else {
            Ok(ProducerOutcome::Completed { events: written })
        }
    }
}
