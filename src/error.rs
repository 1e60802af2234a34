//! Error types for Zynapse.
//!
//! Only unrecoverable conditions live here. A missing or expired record and
//! an abandoned task are ordinary outcomes and are carried by return values
//! (`Option`, `bool`, [`ProducerOutcome`](crate::worker::ProducerOutcome)).

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage backend could not be reached or rejected the command.
    #[error("Storage backend unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A record could not be encoded for writing.
    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Build an `Unavailable` error from a backend failure.
    pub fn unavailable(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Task dispatch errors. All of these are reported synchronously to the
/// caller of `enqueue`; failures during execution only reach the record.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Task queue is full ({capacity} pending tasks)")]
    QueueFull { capacity: usize },

    #[error("Task queue is closed")]
    Closed,

    #[error("Task {task_id} is already queued or running")]
    AlreadyDispatched { task_id: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} stream error: {reason}")]
    Stream { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
