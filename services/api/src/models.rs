//! API Models
//!
//! Request payloads and the views returned to the operator, annotated for
//! OpenAPI generation with `utoipa`.

use examiner_core::tools::ToolCall;
use examiner_core::{Session, Turn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct StartExamPayload {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitAnswerPayload {
    #[schema(example = "A tuple is immutable, a list is not.")]
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub completed: usize,
    pub total: usize,
    pub current_topic: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ToolCallView {
    pub id: String,
    pub name: String,
    #[schema(value_type = Object)]
    pub arguments: Value,
}

impl From<&ToolCall> for ToolCallView {
    fn from(call: &ToolCall) -> Self {
        let raw = call.invocation.arguments_json();
        Self {
            id: call.id.clone(),
            name: call.invocation.name().to_string(),
            arguments: serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnView {
    User { text: String },
    AgentText { text: String },
    AgentToolCall { calls: Vec<ToolCallView> },
    ToolResult { call_id: String, text: String },
}

impl From<&Turn> for TurnView {
    fn from(turn: &Turn) -> Self {
        match turn {
            Turn::User { text } => TurnView::User { text: text.clone() },
            Turn::AgentText { text } => TurnView::AgentText { text: text.clone() },
            Turn::AgentToolCall { calls } => TurnView::AgentToolCall {
                calls: calls.iter().map(ToolCallView::from).collect(),
            },
            Turn::ToolResult { call_id, text } => TurnView::ToolResult {
                call_id: call_id.clone(),
                text: text.clone(),
            },
        }
    }
}

/// Everything the operator needs to render an exam.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ExamView {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub candidate_id: String,
    pub topics: Vec<String>,
    pub progress: ProgressView,
    #[schema(example = "awaiting_candidate")]
    pub state: String,
    pub finished: bool,
    pub recorded: bool,
    pub final_score: Option<f64>,
    pub feedback: Option<String>,
    pub per_topic_scores: Vec<f64>,
    pub transcript: Vec<TurnView>,
    /// A recoverable failure from the last action, for display.
    pub error: Option<String>,
}

impl ExamView {
    pub fn new(id: Uuid, session: &Session, error: Option<String>) -> Self {
        let progress = session.progress();
        Self {
            id,
            candidate_id: session.candidate_id().to_string(),
            topics: session.topics().iter().map(|t| t.to_string()).collect(),
            progress: ProgressView {
                completed: progress.completed,
                total: progress.total,
                current_topic: progress.current_topic.map(|t| t.to_string()),
            },
            state: session.state().to_string(),
            finished: session.is_finished(),
            recorded: session.is_recorded(),
            final_score: session.final_score(),
            feedback: session.feedback().map(str::to_string),
            per_topic_scores: session.per_topic_scores().to_vec(),
            transcript: session.transcript().iter().map(TurnView::from).collect(),
            error,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
