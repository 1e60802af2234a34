//! Anthropic Messages API, streamed.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest_eventsource::{Event, EventSource};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{ChatModel, ChatPrompt, TextStream};
use crate::config::LlmConfig;
use crate::error::LlmError;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What one server-sent event means for the reply.
#[derive(Debug, PartialEq, Eq)]
enum StreamStep {
    Text(String),
    Stop,
    Ignore,
}

/// Streaming client for Claude models.
pub struct AnthropicModel {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicModel {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or_else(|| LlmError::AuthFailed {
            provider: PROVIDER.to_string(),
        })?;
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
        })
    }

    fn build_request_body(&self, prompt: &ChatPrompt) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": prompt.system,
            "messages": [{ "role": "user", "content": prompt.user }],
            "stream": true,
        })
    }
}

fn stream_error(reason: impl Into<String>) -> LlmError {
    LlmError::Stream {
        provider: PROVIDER.to_string(),
        reason: reason.into(),
    }
}

/// Interpret the JSON payload of one event.
fn parse_event(data: &str) -> Result<StreamStep, LlmError> {
    let data: serde_json::Value = serde_json::from_str(data)?;
    match data["type"].as_str() {
        Some("content_block_delta") => match data["delta"]["text"].as_str() {
            Some(text) => Ok(StreamStep::Text(text.to_string())),
            None => Ok(StreamStep::Ignore),
        },
        Some("message_stop") => Ok(StreamStep::Stop),
        Some("error") => {
            let message = data["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            Err(stream_error(message))
        }
        _ => Ok(StreamStep::Ignore),
    }
}

fn map_source_error(err: reqwest_eventsource::Error) -> LlmError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _)
            if status == reqwest::StatusCode::UNAUTHORIZED =>
        {
            LlmError::AuthFailed {
                provider: PROVIDER.to_string(),
            }
        }
        reqwest_eventsource::Error::InvalidStatusCode(status, _) => LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("HTTP {status}"),
        },
        other => stream_error(other.to_string()),
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_reply(&self, prompt: ChatPrompt) -> Result<TextStream, LlmError> {
        debug!(model = %self.model, "stream_reply: called");
        let request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&self.build_request_body(&prompt));

        let source = EventSource::new(request).map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        })?;

        // The event source reconnects on its own after errors; every exit
        // path closes it so a failed reply ends instead of restarting.
        let deltas = stream::unfold(Some(source), |state| async move {
            let mut source = state?;
            loop {
                match source.next().await {
                    // Only `message_stop` ends a reply; anything else is a cut-off.
                    None | Some(Err(reqwest_eventsource::Error::StreamEnded)) => {
                        source.close();
                        return Some((Err(stream_error("stream ended before message_stop")), None));
                    }
                    Some(Ok(Event::Open)) => debug!("stream_reply: opened"),
                    Some(Ok(Event::Message(msg))) => match parse_event(&msg.data) {
                        Ok(StreamStep::Text(text)) => return Some((Ok(text), Some(source))),
                        Ok(StreamStep::Ignore) => {}
                        Ok(StreamStep::Stop) => {
                            debug!("stream_reply: message_stop");
                            source.close();
                            return None;
                        }
                        Err(e) => {
                            source.close();
                            return Some((Err(e), None));
                        }
                    },
                    Some(Err(e)) => {
                        source.close();
                        return Some((Err(map_source_error(e)), None));
                    }
                }
            }
        });

        Ok(deltas.boxed())
    }
}
