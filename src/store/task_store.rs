//! Creating, updating and reading task records under a sliding TTL.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::backend::{KvBackend, make_key};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::state::{MergeOutcome, StateEvent, StateRecord, TaskId};

/// Value stored under a cancellation flag key.
const CANCEL_FLAG: &str = "1";

/// Record store shared by the HTTP handlers (pollers) and the workers
/// (one producer per task).
///
/// Built once at startup and passed around as `Arc<TaskStateStore>`; tests
/// construct their own over an [`InMemoryBackend`](super::InMemoryBackend).
pub struct TaskStateStore {
    backend: Arc<dyn KvBackend>,
    config: StoreConfig,
}

impl TaskStateStore {
    pub fn new(backend: Arc<dyn KvBackend>, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn record_key(&self, id: &TaskId) -> String {
        make_key(&self.config.key_prefix, id.as_str())
    }

    /// Flags live under `<prefix>.cancel`, outside the record keyspace, so no
    /// request id can address one.
    fn cancel_key(&self, id: &TaskId) -> String {
        make_key(&format!("{}.cancel", self.config.key_prefix), id.as_str())
    }

    fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Create a record under a fresh id with `initial` (default
    /// `status: queued`) as its current state and an empty history.
    pub async fn create(&self, initial: Option<StateEvent>) -> Result<TaskId, StoreError> {
        let id = TaskId::new();
        let record = StateRecord::new(initial.unwrap_or_else(StateEvent::queued));
        let payload = serde_json::to_string(&record)?;

        self.backend
            .insert(&self.record_key(&id), &payload, self.ttl())
            .await?;

        debug!(task_id = %id, backend = self.backend.name(), "Task record created");
        Ok(id)
    }

    /// Merge `event` into the record and reset its lifetime.
    ///
    /// Returns `Ok(false)` when there is no live record to update: the id is
    /// unknown, the record expired (also between our read and our write),
    /// or the stored value is not a task record. Only backend failures are
    /// errors.
    pub async fn update(&self, id: &TaskId, event: StateEvent) -> Result<bool, StoreError> {
        let key = self.record_key(id);
        let Some(mut record) = self.load(&key, id).await? else {
            return Ok(false);
        };

        let outcome = record.apply(event, &self.config.merge_type);
        let payload = serde_json::to_string(&record)?;
        let written = self.backend.replace(&key, &payload, self.ttl()).await?;

        if written {
            debug!(
                task_id = %id,
                kind = %record.current.kind,
                archived = outcome == MergeOutcome::Archived,
                history_len = record.history.len(),
                "Task record updated"
            );
        } else {
            debug!(task_id = %id, "Task record expired before write");
        }
        Ok(written)
    }

    /// Current record, or `None` if it never existed, expired, or does not
    /// decode. Never alters the record's lifetime.
    pub async fn read(&self, id: &TaskId) -> Result<Option<StateRecord>, StoreError> {
        self.load(&self.record_key(id), id).await
    }

    /// Remaining lifetime of a live record.
    pub async fn remaining_ttl(&self, id: &TaskId) -> Result<Option<Duration>, StoreError> {
        self.backend.ttl(&self.record_key(id)).await
    }

    /// Remove a record (and any cancellation flag) before it expires.
    pub async fn delete(&self, id: &TaskId) -> Result<bool, StoreError> {
        self.backend.delete(&self.cancel_key(id)).await?;
        self.backend.delete(&self.record_key(id)).await
    }

    /// Ask the producer of a live task to stop.
    ///
    /// The flag lives next to the record with the same lifetime and is
    /// checked by the producer between events. Returns `false` if there is
    /// no live record.
    pub async fn request_cancel(&self, id: &TaskId) -> Result<bool, StoreError> {
        if self.read(id).await?.is_none() {
            return Ok(false);
        }
        self.backend
            .insert(&self.cancel_key(id), CANCEL_FLAG, self.ttl())
            .await?;
        info!(task_id = %id, "Cancellation requested");
        Ok(true)
    }

    pub async fn is_cancel_requested(&self, id: &TaskId) -> Result<bool, StoreError> {
        Ok(self.backend.get(&self.cancel_key(id)).await?.is_some())
    }

    async fn load(&self, key: &str, id: &TaskId) -> Result<Option<StateRecord>, StoreError> {
        let Some(raw) = self.backend.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<StateRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(task_id = %id, error = %e, "Malformed task record, treating as not found");
                Ok(None)
            }
        }
    }
}
