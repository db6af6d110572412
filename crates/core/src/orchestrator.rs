//! Exam Orchestrator
//!
//! Drives one session through the exam protocol:
//!
//! - every candidate answer is appended and followed by a model call;
//! - text replies hand the turn back to the candidate;
//! - tool calls are applied in order, then the model is asked again without
//!   new input, so a topic transition is immediately followed by the next
//!   question or by `finish_exam`;
//! - `finish_exam` ends the session and hands the transcript to the recorder.
//!
//! The orchestrator borrows the session mutably for the whole exchange, so at
//! most one model call is ever in flight per session.

use crate::agent::{AdapterError, AgentReply, ExamAgent};
use crate::recorder::{ResultRecorder, StorageError};
use crate::session::{ExamState, Session};
use crate::tools::{ToolCall, ToolInvocation};
use crate::transcript::Turn;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Opening line shown before the first question is generated.
pub const OPENING_GREETING: &str = "Hello! I am your AI Examiner. I'm reviewing your profile...";

#[derive(Debug, thiserror::Error)]
pub enum ExamError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("The exam result could not be saved: {0}")]
    Storage(#[from] StorageError),
    #[error("The exam is already finished")]
    Finished,
    #[error("The exam is not waiting for an answer (state: {0})")]
    NotAwaitingCandidate(ExamState),
    #[error("The examiner kept calling tools after {limit} rounds without replying")]
    ToolLoopLimit { limit: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Consecutive tool-call batches applied before the loop is cut off.
    /// Values below 1 are treated as 1.
    pub max_tool_rounds: usize,
    /// Total attempts at writing the final result, including the first.
    pub record_attempts: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: 8,
            record_attempts: 2,
        }
    }
}

pub struct ExamOrchestrator {
    agent: Arc<dyn ExamAgent>,
    recorder: Arc<dyn ResultRecorder>,
    settings: OrchestratorSettings,
}

impl ExamOrchestrator {
    pub fn new(agent: Arc<dyn ExamAgent>, recorder: Arc<dyn ResultRecorder>) -> Self {
        Self {
            agent,
            recorder,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Opens the exam: greets the candidate and generates the first question
    /// before any input is required.
    #[instrument(skip_all, fields(candidate = %session.candidate_id()))]
    pub async fn start(&self, session: &mut Session) -> Result<(), ExamError> {
        if session.is_finished() {
            return Err(ExamError::Finished);
        }
        if session.transcript().is_empty() {
            session.push_turn(Turn::AgentText {
                text: OPENING_GREETING.to_string(),
            });
        }
        info!(topics = ?session.topics(), "Exam started");
        self.run(session).await
    }

    /// Records the candidate's answer and lets the examiner respond.
    #[instrument(skip_all, fields(candidate = %session.candidate_id()))]
    pub async fn submit_answer(
        &self,
        session: &mut Session,
        text: impl Into<String>,
    ) -> Result<(), ExamError> {
        if session.is_finished() {
            return Err(ExamError::Finished);
        }
        if session.state() != ExamState::AwaitingCandidate {
            return Err(ExamError::NotAwaitingCandidate(session.state()));
        }
        session.push_turn(Turn::User { text: text.into() });
        self.run(session).await
    }

    /// Retries whatever the session is stuck on, without new candidate input.
    ///
    /// For an open exam this asks the examiner again, e.g. after a timeout.
    /// For a finished exam whose result was not saved it retries the write.
    #[instrument(skip_all, fields(candidate = %session.candidate_id()))]
    pub async fn resume(&self, session: &mut Session) -> Result<(), ExamError> {
        if session.is_finished() {
            if session.is_recorded() {
                return Err(ExamError::Finished);
            }
            return self.flush_result(session).await;
        }
        self.run(session).await
    }

    /// The generate/apply loop. Returns once the turn is back with the
    /// candidate, the exam is over, or something failed.
    async fn run(&self, session: &mut Session) -> Result<(), ExamError> {
        let limit = self.settings.max_tool_rounds.max(1);
        let mut tool_rounds = 0;
        loop {
            session.set_state(ExamState::GeneratingReply);
            debug!(
                index = session.current_topic_index(),
                "Requesting examiner reply"
            );
            let reply = self
                .agent
                .generate(
                    session.transcript(),
                    session.current_topic(),
                    session.remaining_topics(),
                )
                .await;

            match reply {
                AgentReply::Error(e) => {
                    warn!(error = %e, "Examiner reply failed; session left unchanged");
                    session.set_state(ExamState::AwaitingCandidate);
                    return Err(e.into());
                }
                AgentReply::Text { content } => {
                    session.push_turn(Turn::AgentText { text: content });
                    session.set_state(ExamState::AwaitingCandidate);
                    return Ok(());
                }
                AgentReply::ToolCalls { calls } => {
                    // Every applied batch gets its follow-up call; only a
                    // batch beyond the bound is refused, and it is not kept.
                    if tool_rounds >= limit {
                        error!(limit, dropped = calls.len(), "Examiner kept calling tools; stopping");
                        session.set_state(ExamState::AwaitingCandidate);
                        return Err(ExamError::ToolLoopLimit { limit });
                    }
                    session.push_turn(Turn::AgentToolCall {
                        calls: calls.clone(),
                    });
                    session.set_state(ExamState::ApplyingToolEffects);
                    if self.apply_tool_calls(session, calls) {
                        return self.flush_result(session).await;
                    }
                    tool_rounds += 1;
                }
            }
        }
    }

    /// Applies a batch of tool calls in order. Returns `true` if the exam
    /// finished, in which case later calls in the batch are dropped.
    fn apply_tool_calls(&self, session: &mut Session, calls: Vec<ToolCall>) -> bool {
        for call in calls {
            match call.invocation {
                ToolInvocation::TransitionTopic(args) => {
                    let topic = session.current_topic().cloned();
                    let text = if session.conclude_topic(args.topic_score) {
                        info!(
                            topic = ?topic.as_ref().map(|t| t.as_str()),
                            score = args.topic_score,
                            next = ?args.next_topic_name,
                            "Topic concluded"
                        );
                        format!(
                            "Topic concluded. Score: {}. Reason: {}. Switching to next topic.",
                            args.topic_score, args.reasoning
                        )
                    } else {
                        warn!("transition_topic called with no topic in progress");
                        "No topic is in progress, so the score was not recorded. \
                         Call 'finish_exam' to conclude the exam."
                            .to_string()
                    };
                    session.push_turn(Turn::ToolResult {
                        call_id: call.id,
                        text,
                    });
                }
                ToolInvocation::FinishExam(args) => {
                    info!(
                        final_score = args.final_score,
                        completed = session.current_topic_index(),
                        total = session.topics().len(),
                        "Exam finished"
                    );
                    session.finish(args.final_score, args.feedback);
                    session.push_turn(Turn::ToolResult {
                        call_id: call.id,
                        text: "Exam finished recorded.".to_string(),
                    });
                    session.set_state(ExamState::Finished);
                    return true;
                }
                ToolInvocation::Unrecognized { name, .. } => {
                    warn!(tool = %name, "Ignoring unrecognized tool call");
                    session.push_turn(Turn::ToolResult {
                        call_id: call.id,
                        text: format!("Unknown tool '{}' was ignored.", name),
                    });
                }
            }
        }
        false
    }

    /// Writes the final result, retrying up to the configured attempt count.
    async fn flush_result(&self, session: &mut Session) -> Result<(), ExamError> {
        let Some(final_score) = session.final_score() else {
            return Ok(());
        };
        let attempts = self.settings.record_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .recorder
                .record(session.candidate_id(), final_score, session.transcript())
                .await
            {
                Ok(()) => {
                    session.mark_recorded();
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(error = %e, attempt, "Saving exam result failed; retrying");
                }
                Err(e) => {
                    error!(error = %e, attempt, "Saving exam result failed");
                    return Err(e.into());
                }
            }
        }
    }
}
