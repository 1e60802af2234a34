use serde::{Deserialize, Serialize};

/// Body of `POST /chat`, also the payload handed to the chat task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    /// Notebook page the question is asked from.
    pub page_id: String,
}
