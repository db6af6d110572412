//! Examiner Tools
//!
//! The model steers the exam through two callable tools. Their argument
//! payloads arrive as JSON strings; this module declares their schemas and
//! parses them into typed invocations, rejecting anything that does not match.

use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionTool, ChatCompletionToolArgs,
    ChatCompletionToolType, FunctionCall, FunctionObjectArgs,
};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TRANSITION_TOPIC: &str = "transition_topic";
pub const FINISH_EXAM: &str = "finish_exam";

const MIN_SCORE: f64 = 0.0;
const MAX_SCORE: f64 = 10.0;

/// Arguments for concluding the current topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransitionTopicArgs {
    /// Score for the current topic (0 to 10). Must be a number, not a string.
    pub topic_score: f64,
    /// Brief reasoning for the score.
    pub reasoning: String,
    /// The name of the next topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_topic_name: Option<String>,
}

/// Arguments for concluding the whole exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinishExamArgs {
    /// Overall score (0 to 10). Must be a number.
    pub final_score: f64,
    /// Detailed feedback for the student.
    pub feedback: String,
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolInvocation {
    TransitionTopic(TransitionTopicArgs),
    FinishExam(FinishExamArgs),
    /// A tool outside the declared set. Kept so the orchestrator can answer it.
    Unrecognized { name: String, arguments: String },
}

/// A tool call as issued by the model, identified for its result turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(flatten)]
    pub invocation: ToolInvocation,
}

/// Why a tool call's arguments were rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolArgumentError {
    #[error("arguments for '{tool}' are invalid: {reason}")]
    Invalid { tool: String, reason: String },
    #[error("'{field}' for '{tool}' must be between 0 and 10, got {value}")]
    ScoreOutOfRange {
        tool: String,
        field: &'static str,
        value: f64,
    },
}

impl ToolInvocation {
    /// Parses a string-encoded argument payload for the named tool.
    ///
    /// Unknown fields are ignored; missing required fields and non-numeric
    /// scores are errors. Scores are never coerced from strings.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolArgumentError> {
        match name {
            TRANSITION_TOPIC => {
                let args: TransitionTopicArgs = decode(name, arguments)?;
                check_score(name, "topic_score", args.topic_score)?;
                Ok(Self::TransitionTopic(args))
            }
            FINISH_EXAM => {
                let args: FinishExamArgs = decode(name, arguments)?;
                check_score(name, "final_score", args.final_score)?;
                Ok(Self::FinishExam(args))
            }
            other => Ok(Self::Unrecognized {
                name: other.to_string(),
                arguments: arguments.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::TransitionTopic(_) => TRANSITION_TOPIC,
            Self::FinishExam(_) => FINISH_EXAM,
            Self::Unrecognized { name, .. } => name,
        }
    }

    /// Re-encodes the arguments the way the model sent them, for replay.
    pub fn arguments_json(&self) -> String {
        let encoded = match self {
            Self::TransitionTopic(args) => serde_json::to_string(args),
            Self::FinishExam(args) => serde_json::to_string(args),
            Self::Unrecognized { arguments, .. } => return arguments.clone(),
        };
        encoded.unwrap_or_else(|_| "{}".to_string())
    }
}

impl ToolCall {
    pub fn new(id: impl Into<String>, invocation: ToolInvocation) -> Self {
        Self {
            id: id.into(),
            invocation,
        }
    }

    /// Validates a raw call from the model.
    pub fn from_raw(raw: &ChatCompletionMessageToolCall) -> Result<Self, ToolArgumentError> {
        let invocation = ToolInvocation::parse(&raw.function.name, &raw.function.arguments)?;
        Ok(Self::new(raw.id.clone(), invocation))
    }

    /// Converts back into the wire form for replaying history to the model.
    pub fn to_raw(&self) -> ChatCompletionMessageToolCall {
        ChatCompletionMessageToolCall {
            id: self.id.clone(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: self.invocation.name().to_string(),
                arguments: self.invocation.arguments_json(),
            },
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    tool: &str,
    arguments: &str,
) -> Result<T, ToolArgumentError> {
    serde_json::from_str(arguments).map_err(|e| ToolArgumentError::Invalid {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn check_score(tool: &str, field: &'static str, value: f64) -> Result<(), ToolArgumentError> {
    if (MIN_SCORE..=MAX_SCORE).contains(&value) {
        Ok(())
    } else {
        Err(ToolArgumentError::ScoreOutOfRange {
            tool: tool.to_string(),
            field,
            value,
        })
    }
}

/// Derives the JSON schema the model is given for a tool's arguments.
fn parameters_for<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
        map.remove("title");
    }
    schema
}

/// The two tools declared to the model on every call.
pub fn tool_definitions() -> anyhow::Result<Vec<ChatCompletionTool>> {
    let transition = ChatCompletionToolArgs::default()
        .function(
            FunctionObjectArgs::default()
                .name(TRANSITION_TOPIC)
                .description(
                    "Call this to move to the next topic. Provide a score (number 0-10) and reasoning.",
                )
                .parameters(parameters_for::<TransitionTopicArgs>())
                .build()?,
        )
        .build()?;
    let finish = ChatCompletionToolArgs::default()
        .function(
            FunctionObjectArgs::default()
                .name(FINISH_EXAM)
                .description("Call this when the exam is finished (no topics remaining).")
                .parameters(parameters_for::<FinishExamArgs>())
                .build()?,
        )
        .build()?;
    Ok(vec![transition, finish])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transition_topic() {
        let parsed = ToolInvocation::parse(
            TRANSITION_TOPIC,
            r#"{"topic_score": 7, "reasoning": "ok", "next_topic_name": "X"}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            ToolInvocation::TransitionTopic(TransitionTopicArgs {
                topic_score: 7.0,
                reasoning: "ok".to_string(),
                next_topic_name: Some("X".to_string()),
            })
        );
    }

    #[test]
    fn test_next_topic_name_is_optional_and_extra_fields_are_ignored() {
        let parsed = ToolInvocation::parse(
            TRANSITION_TOPIC,
            r#"{"topic_score": 4.5, "reasoning": "partial", "confidence": "high"}"#,
        )
        .unwrap();
        match parsed {
            ToolInvocation::TransitionTopic(args) => {
                assert_eq!(args.topic_score, 4.5);
                assert_eq!(args.next_topic_name, None);
            }
            other => panic!("Expected TransitionTopic, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_topic_score_is_rejected() {
        let err = ToolInvocation::parse(TRANSITION_TOPIC, r#"{"reasoning": "ok"}"#).unwrap_err();
        match err {
            ToolArgumentError::Invalid { tool, reason } => {
                assert_eq!(tool, TRANSITION_TOPIC);
                assert!(reason.contains("topic_score"));
            }
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_string_score_is_not_coerced() {
        let err = ToolInvocation::parse(FINISH_EXAM, r#"{"final_score": "8", "feedback": "Good"}"#)
            .unwrap_err();
        assert!(matches!(err, ToolArgumentError::Invalid { .. }));
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let err = ToolInvocation::parse(FINISH_EXAM, r#"{"final_score": 11, "feedback": "Wow"}"#)
            .unwrap_err();
        assert_eq!(
            err,
            ToolArgumentError::ScoreOutOfRange {
                tool: FINISH_EXAM.to_string(),
                field: "final_score",
                value: 11.0,
            }
        );
    }

    #[test]
    fn test_non_json_arguments_are_rejected() {
        assert!(ToolInvocation::parse(FINISH_EXAM, "final_score=8").is_err());
    }

    #[test]
    fn test_unknown_tool_passes_through() {
        let parsed = ToolInvocation::parse("skip_topic", r#"{"why": "bored"}"#).unwrap();
        assert_eq!(
            parsed,
            ToolInvocation::Unrecognized {
                name: "skip_topic".to_string(),
                arguments: r#"{"why": "bored"}"#.to_string(),
            }
        );
        assert_eq!(parsed.name(), "skip_topic");
        assert_eq!(parsed.arguments_json(), r#"{"why": "bored"}"#);
    }

    #[test]
    fn test_raw_call_conversion_keeps_id_and_name() {
        let call = ToolCall::new(
            "call_1",
            ToolInvocation::FinishExam(FinishExamArgs {
                final_score: 8.0,
                feedback: "Good".to_string(),
            }),
        );
        let raw = call.to_raw();
        assert_eq!(raw.id, "call_1");
        assert_eq!(raw.function.name, FINISH_EXAM);

        let back = ToolCall::from_raw(&raw).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn test_tool_definitions_declare_required_fields() {
        let tools = tool_definitions().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.function.name.as_str()).collect();
        assert_eq!(names, vec![TRANSITION_TOPIC, FINISH_EXAM]);

        let transition = tools[0].function.parameters.clone().unwrap();
        let required = transition["required"].as_array().unwrap();
        assert!(required.contains(&Value::from("topic_score")));
        assert!(required.contains(&Value::from("reasoning")));
        assert!(!required.contains(&Value::from("next_topic_name")));
        assert_eq!(transition["properties"]["topic_score"]["type"], "number");
        assert!(transition.get("$schema").is_none());

        let finish = tools[1].function.parameters.clone().unwrap();
        let required = finish["required"].as_array().unwrap();
        assert!(required.contains(&Value::from("final_score")));
        assert!(required.contains(&Value::from("feedback")));
    }

    #[test]
    fn test_tool_call_serializes_name_and_arguments() {
        let call = ToolCall::new(
            "call_9",
            ToolInvocation::TransitionTopic(TransitionTopicArgs {
                topic_score: 6.0,
                reasoning: "fine".to_string(),
                next_topic_name: None,
            }),
        );
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["id"], "call_9");
        assert_eq!(json["name"], "transition_topic");
        assert_eq!(json["arguments"]["topic_score"], 6.0);
    }
}
