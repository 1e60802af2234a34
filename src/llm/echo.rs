//! Offline model that streams the user's question back word by word.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};

use super::{ChatModel, ChatPrompt, TextStream};
use crate::error::LlmError;

#[derive(Debug, Clone, Default)]
pub struct EchoModel {
    delay: Duration,
}

impl EchoModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause before every delta, to mimic a real model's pace.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ChatModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn stream_reply(&self, prompt: ChatPrompt) -> Result<TextStream, LlmError> {
        let deltas: Vec<String> = prompt
            .user
            .split_whitespace()
            .enumerate()
            .map(|(i, word)| if i == 0 { word.to_string() } else { format!(" {word}") })
            .collect();
        let delay = self.delay;

        Ok(stream::iter(deltas)
            .then(move |delta| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, LlmError>(delta)
            })
            .boxed())
    }
}
