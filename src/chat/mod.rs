//! Chat turns: the HTTP surface and the task that answers them.

pub mod request;
pub mod routes;
pub mod task;

pub use request::ChatRequest;
pub use routes::{AppState, chat_routes};
pub use task::ChatTask;
