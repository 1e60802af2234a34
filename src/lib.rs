//! Zynapse: a chat backend whose replies are produced by background tasks
//! and polled from an expiring task-state store.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod state;
pub mod store;
pub mod worker;
