//! Worker side of a task: the body that yields events, the producer that
//! persists them, and the dispatcher that runs producers.

pub mod dispatcher;
pub mod producer;
pub mod task;

pub use dispatcher::{Dispatcher, LocalDispatcher};
pub use producer::{Producer, ProducerOutcome};
pub use task::{EventStream, TaskBody, TaskContext};
