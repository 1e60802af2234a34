//! Chat model integration.
//!
//! Supports:
//! - **Anthropic**: Messages API with server-sent events
//! - **Echo**: offline model that repeats the question, for development
//!   and tests

pub mod anthropic;
pub mod echo;

pub use anthropic::AnthropicModel;
pub use echo::EchoModel;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::{LlmBackend, LlmConfig};
use crate::error::LlmError;

/// Stream of text deltas for one reply.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// One chat turn to send to a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

/// A model that streams its reply as text deltas.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Start a reply.
    ///
    /// A failure may be returned here or arrive as an item of the stream,
    /// depending on the model; connection and HTTP errors usually come as
    /// the stream's first item. The stream ends after yielding an error.
    async fn stream_reply(&self, prompt: ChatPrompt) -> Result<TextStream, LlmError>;
}

/// Create a chat model from configuration.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => {
            let model = AnthropicModel::from_config(config)?;
            tracing::info!("Using Anthropic (model: {})", config.model);
            Ok(Arc::new(model))
        }
        LlmBackend::Echo => {
            tracing::info!("Using echo model");
            Ok(Arc::new(EchoModel::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_requires_api_key() {
        let config = LlmConfig::default();
        let err = create_model(&config).err().unwrap();
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn echo_needs_nothing() {
        let config = LlmConfig {
            backend: LlmBackend::Echo,
            ..LlmConfig::default()
        };
        assert_eq!(create_model(&config).unwrap().model_name(), "echo");
    }
}
