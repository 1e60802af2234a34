//! Task state model: events, records and the merge policy applied on
//! every write.

pub mod event;
pub mod record;

pub use event::{
    ERROR_TYPE, MESSAGE_TYPE, SOURCES_TYPE, STATUS_TYPE, StateEvent, TaskId, TaskStatus,
};
pub use record::{MergeOutcome, StateRecord};
