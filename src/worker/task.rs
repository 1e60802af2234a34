//! What a worker runs for one task.

use futures::stream::BoxStream;

use crate::state::{StateEvent, TaskId};

/// Ordered, finite stream of events produced by one task.
pub type EventStream = BoxStream<'static, StateEvent>;

/// Context handed to a task body when it starts.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
}

/// Application logic behind a task.
///
/// The returned stream is lazy: the producer pulls the next event only after
/// the previous one has been persisted, and drops the stream as soon as the
/// record is gone.
pub trait TaskBody: Send + Sync {
    /// Body name for logs.
    fn name(&self) -> &str;

    /// Start the task for `payload`.
    fn events(&self, ctx: TaskContext, payload: String) -> EventStream;
}
