//! Record store: task records kept in an expiring key-value backend.

pub mod backend;
pub mod memory;
pub mod redis;
pub mod task_store;

pub use backend::{KvBackend, make_key};
pub use memory::{InMemoryBackend, spawn_sweeper};
pub use redis::RedisBackend;
pub use task_store::TaskStateStore;
