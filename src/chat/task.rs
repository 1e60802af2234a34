//! Chat task: answers one question by streaming a model reply into the
//! task's record.
//!
//! Event sequence for a successful turn:
//!
//! ```text
//! status:started, message:"Hi", message:"Hi there", ..., status:done
//! ```
//!
//! Each `message` carries the whole reply so far, so a poller that only sees
//! the collapsed `current` still gets the full partial answer. Failures end
//! with an `error` event followed by `status:error`.

use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{info, warn};

use super::request::ChatRequest;
use crate::llm::{ChatModel, ChatPrompt, TextStream};
use crate::state::{StateEvent, TaskId, TaskStatus};
use crate::worker::{EventStream, TaskBody, TaskContext};

/// [`TaskBody`] for chat turns.
pub struct ChatTask {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
}

impl ChatTask {
    pub fn new(model: Arc<dyn ChatModel>, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
        }
    }
}

impl TaskBody for ChatTask {
    fn name(&self) -> &str {
        "chat"
    }

    fn events(&self, ctx: TaskContext, payload: String) -> EventStream {
        let turn = Turn {
            task_id: ctx.task_id,
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            phase: Phase::Parse(payload),
        };
        stream::unfold(turn, next_event).boxed()
    }
}

enum Phase {
    Parse(String),
    Connect(ChatPrompt),
    Stream { deltas: TextStream, reply: String },
    Fail(String),
    Finish(TaskStatus),
    End,
}

struct Turn {
    task_id: TaskId,
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    phase: Phase,
}

async fn next_event(mut turn: Turn) -> Option<(StateEvent, Turn)> {
    loop {
        match std::mem::replace(&mut turn.phase, Phase::End) {
            Phase::Parse(payload) => match serde_json::from_str::<ChatRequest>(&payload) {
                Ok(request) => {
                    info!(
                        task_id = %turn.task_id,
                        page_id = %request.page_id,
                        model = turn.model.model_name(),
                        "Chat turn started"
                    );
                    turn.phase = Phase::Connect(ChatPrompt {
                        system: turn.system_prompt.clone(),
                        user: request.query,
                    });
                    return Some((StateEvent::status(TaskStatus::Started), turn));
                }
                Err(e) => {
                    warn!(task_id = %turn.task_id, error = %e, "Invalid chat payload");
                    turn.phase = Phase::Finish(TaskStatus::Error);
                    return Some((StateEvent::error(format!("Invalid chat request: {e}")), turn));
                }
            },
            Phase::Connect(prompt) => match turn.model.stream_reply(prompt).await {
                Ok(deltas) => {
                    turn.phase = Phase::Stream {
                        deltas,
                        reply: String::new(),
                    }
                }
                Err(e) => turn.phase = Phase::Fail(e.to_string()),
            },
            Phase::Stream { mut deltas, mut reply } => match deltas.next().await {
                Some(Ok(delta)) => {
                    let empty = delta.is_empty();
                    reply.push_str(&delta);
                    let event = StateEvent::message(reply.clone());
                    turn.phase = Phase::Stream { deltas, reply };
                    if !empty {
                        return Some((event, turn));
                    }
                }
                Some(Err(e)) => turn.phase = Phase::Fail(e.to_string()),
                None => {
                    info!(task_id = %turn.task_id, reply_len = reply.len(), "Chat turn finished");
                    turn.phase = Phase::Finish(TaskStatus::Done);
                }
            },
            Phase::Fail(message) => {
                warn!(task_id = %turn.task_id, error = %message, "Chat turn failed");
                turn.phase = Phase::Finish(TaskStatus::Error);
                return Some((StateEvent::error(message), turn));
            }
            Phase::Finish(status) => return Some((StateEvent::status(status), turn)),
            Phase::End => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::EchoModel;

    /// Refuses every request.
    struct DownModel;

    #[async_trait]
    impl ChatModel for DownModel {
        fn model_name(&self) -> &str {
            "down"
        }
        async fn stream_reply(&self, _prompt: ChatPrompt) -> Result<TextStream, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "down".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    /// Sends one delta, then breaks.
    struct FlakyModel;

    #[async_trait]
    impl ChatModel for FlakyModel {
        fn model_name(&self) -> &str {
            "flaky"
        }
        async fn stream_reply(&self, _prompt: ChatPrompt) -> Result<TextStream, LlmError> {
            Ok(stream::iter(vec![
                Ok("Par".to_string()),
                Err(LlmError::Stream {
                    provider: "flaky".to_string(),
                    reason: "connection reset".to_string(),
                }),
                Ok("never".to_string()),
            ])
            .boxed())
        }
    }

    fn ctx() -> TaskContext {
        TaskContext {
            task_id: TaskId::from("t-1"),
        }
    }

    fn payload(query: &str) -> String {
        serde_json::to_string(&ChatRequest {
            query: query.to_string(),
            page_id: "page-1".to_string(),
        })
        .unwrap()
    }

    async fn run(model: Arc<dyn ChatModel>, payload: String) -> Vec<StateEvent> {
        ChatTask::new(model, "Be brief.")
            .events(ctx(), payload)
            .collect()
            .await
    }

    #[tokio::test]
    async fn successful_turn_accumulates_reply() {
        let events = run(Arc::new(EchoModel::new()), payload("Hi there")).await;
        assert_eq!(
            events,
            vec![
                StateEvent::status(TaskStatus::Started),
                StateEvent::message("Hi"),
                StateEvent::message("Hi there"),
                StateEvent::status(TaskStatus::Done),
            ]
        );
    }

    #[tokio::test]
    async fn model_refusal_ends_in_error() {
        let events = run(Arc::new(DownModel), payload("Hi")).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StateEvent::status(TaskStatus::Started));
        assert!(events[1].is_kind("error"));
        assert!(events[1].content.as_str().unwrap().contains("connection refused"));
        assert_eq!(events[2], StateEvent::status(TaskStatus::Error));
    }

    #[tokio::test]
    async fn broken_stream_keeps_partial_reply_then_errors() {
        let events = run(Arc::new(FlakyModel), payload("Hi")).await;
        assert_eq!(events[1], StateEvent::message("Par"));
        assert!(events[2].is_kind("error"));
        assert_eq!(events.last(), Some(&StateEvent::status(TaskStatus::Error)));
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn bad_payload_skips_model() {
        let events = run(Arc::new(DownModel), "{\"query\": 5}".to_string()).await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_kind("error"));
        assert!(events[0].content.as_str().unwrap().starts_with("Invalid chat request"));
        assert_eq!(events[1], StateEvent::status(TaskStatus::Error));
    }

    #[tokio::test]
    async fn empty_question_still_finishes() {
        let events = run(Arc::new(EchoModel::new()), payload("")).await;
        assert_eq!(
            events,
            vec![
                StateEvent::status(TaskStatus::Started),
                StateEvent::status(TaskStatus::Done),
            ]
        );
    }

    #[tokio::test]
    async fn reply_cut_off_mid_stream_is_not_done() {
        let model = crate::llm::anthropic::tests::model_serving(
            crate::llm::anthropic::tests::TRUNCATED_REPLY,
        )
        .await;
        let events = run(Arc::new(model), payload("What is the answer?")).await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], StateEvent::status(TaskStatus::Started));
        assert_eq!(events[1], StateEvent::message("The answer is"));
        assert!(events[2].is_kind("error"));
        assert!(events[2].content.as_str().unwrap().contains("message_stop"));
        assert_eq!(events[3], StateEvent::status(TaskStatus::Error));
    }
}
