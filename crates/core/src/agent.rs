//! Examiner Agent Adapter
//!
//! This module turns session state into a model call and the model's answer
//! back into something the orchestrator can act on. It owns the examiner's
//! system instruction, the replay of the transcript as chat messages, and
//! validation of tool-call arguments. Failures never escape as panics or
//! errors: they come back as `AgentReply::Error` so the session is left intact.

use crate::llm_client::{EmptyResponse, LLMAction, LLMClient};
use crate::tools::{ToolCall, tool_definitions};
use crate::topic::Topic;
use crate::transcript::{Transcript, Turn};
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Why the adapter could not produce a usable reply.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("The examiner did not answer in time")]
    Timeout,
    #[error("The examiner could not be reached: {0}")]
    Transport(String),
    #[error("The examiner returned an invalid reply: {0}")]
    Malformed(String),
}

/// What the examiner decided to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    Text { content: String },
    ToolCalls { calls: Vec<ToolCall> },
    Error(AdapterError),
}

/// Produces the examiner's next move for a session.
#[async_trait]
pub trait ExamAgent: Send + Sync {
    /// `current_topic` is `None` once every topic is concluded, which asks
    /// the examiner to wrap up.
    async fn generate(
        &self,
        history: &Transcript,
        current_topic: Option<&Topic>,
        remaining_topics: &[Topic],
    ) -> AgentReply;
}

/// Builds the instruction that frames every model call.
pub fn system_instruction(current_topic: Option<&Topic>, remaining_topics: &[Topic]) -> String {
    let mut content = String::from(
        "You are a professional technical interviewer AI. You are examining a student.\n",
    );
    match current_topic {
        Some(topic) => {
            content.push_str(&format!(
                "The CURRENT TOPIC is: '{}'.\n\
                 Ask questions to probe the student's understanding. \
                 Start general, then drill down or give hints if needed.\n\
                 When satisfied, OR if the student gives up, YOU MUST call the 'transition_topic' tool immediately. \
                 Do not output text when you intend to call a tool.",
                topic
            ));
            if remaining_topics.is_empty() {
                content.push_str(" This is the last topic.");
            } else {
                let names: Vec<&str> = remaining_topics.iter().map(Topic::as_str).collect();
                content.push_str(&format!(" Future topics: {}.", names.join(", ")));
            }
        }
        None => {
            content.push_str("The exam is finished. Review the history and call 'finish_exam'.");
        }
    }
    content
}

/// Converts the transcript into the chat messages the model is replayed.
pub fn history_messages(
    history: &Transcript,
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    history
        .iter()
        .map(|turn| -> Result<ChatCompletionRequestMessage, OpenAIError> {
            Ok(match turn {
                Turn::User { text } => ChatCompletionRequestUserMessageArgs::default()
                    .content(text.clone())
                    .build()?
                    .into(),
                Turn::AgentText { text } => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(text.clone())
                    .build()?
                    .into(),
                Turn::AgentToolCall { calls } => {
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .tool_calls(calls.iter().map(ToolCall::to_raw).collect::<Vec<_>>())
                        .build()?
                        .into()
                }
                Turn::ToolResult { call_id, text } => {
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(call_id.clone())
                        .content(text.clone())
                        .build()?
                        .into()
                }
            })
        })
        .collect()
}

/// The production `ExamAgent`, backed by an `LLMClient`.
pub struct ExaminerAgent {
    llm_client: Arc<dyn LLMClient>,
    timeout: Duration,
}

impl ExaminerAgent {
    pub fn new(llm_client: Arc<dyn LLMClient>, timeout: Duration) -> Self {
        Self {
            llm_client,
            timeout,
        }
    }

    fn build_messages(
        &self,
        history: &Transcript,
        current_topic: Option<&Topic>,
        remaining_topics: &[Topic],
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_instruction(current_topic, remaining_topics))
                    .build()?
                    .into(),
            ];
        messages.extend(history_messages(history)?);
        Ok(messages)
    }
}

#[async_trait]
impl ExamAgent for ExaminerAgent {
    #[instrument(skip_all, fields(current_topic = ?current_topic.map(Topic::as_str), turns = history.len()))]
    async fn generate(
        &self,
        history: &Transcript,
        current_topic: Option<&Topic>,
        remaining_topics: &[Topic],
    ) -> AgentReply {
        let messages = match self.build_messages(history, current_topic, remaining_topics) {
            Ok(messages) => messages,
            Err(e) => return AgentReply::Error(AdapterError::Transport(e.to_string())),
        };
        let tools = match tool_definitions() {
            Ok(tools) => tools,
            Err(e) => return AgentReply::Error(AdapterError::Transport(e.to_string())),
        };

        let action = match tokio::time::timeout(
            self.timeout,
            self.llm_client.decide_action(messages, tools),
        )
        .await
        {
            Err(_) => {
                warn!(timeout = ?self.timeout, "Model call timed out");
                return AgentReply::Error(AdapterError::Timeout);
            }
            Ok(Err(e)) if e.downcast_ref::<EmptyResponse>().is_some() => {
                warn!("Model returned an empty reply");
                return AgentReply::Error(AdapterError::Malformed(e.to_string()));
            }
            Ok(Err(e)) => {
                warn!(error = ?e, "Model call failed");
                return AgentReply::Error(AdapterError::Transport(e.to_string()));
            }
            Ok(Ok(action)) => action,
        };

        match action {
            LLMAction::TextResponse(content) => {
                debug!("Model replied with text");
                AgentReply::Text { content }
            }
            LLMAction::ToolCall(raw_calls) if raw_calls.is_empty() => AgentReply::Error(
                AdapterError::Malformed("tool call list was empty".to_string()),
            ),
            LLMAction::ToolCall(raw_calls) => {
                match raw_calls
                    .iter()
                    .map(ToolCall::from_raw)
                    .collect::<Result<Vec<_>, _>>()
                {
                    Ok(calls) => {
                        debug!(count = calls.len(), "Model requested tool calls");
                        AgentReply::ToolCalls { calls }
                    }
                    Err(e) => {
                        warn!(error = %e, "Rejected malformed tool call");
                        AgentReply::Error(AdapterError::Malformed(e.to_string()))
                    }
                }
            }
        }
    }
}
