//! Exam Session State
//!
//! A `Session` is the complete state of one candidate's attempt. Its fields
//! are readable by anyone but only the orchestrator mutates them, which is
//! what keeps the scores and topic index consistent.

use crate::topic::Topic;
use crate::transcript::{Transcript, Turn};
use serde::Serialize;
use std::fmt;

/// Where the orchestration state machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamState {
    AwaitingCandidate,
    GeneratingReply,
    ApplyingToolEffects,
    Finished,
}

impl fmt::Display for ExamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExamState::AwaitingCandidate => "awaiting_candidate",
            ExamState::GeneratingReply => "generating_reply",
            ExamState::ApplyingToolEffects => "applying_tool_effects",
            ExamState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Read-only summary of how far the candidate has come.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub current_topic: Option<Topic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    candidate_id: String,
    topics: Vec<Topic>,
    current_topic_index: usize,
    transcript: Transcript,
    per_topic_scores: Vec<f64>,
    final_score: Option<f64>,
    feedback: Option<String>,
    finished: bool,
    recorded: bool,
    state: ExamState,
}

impl Session {
    /// Creates a session positioned on the first of `topics`.
    pub fn new(candidate_id: impl Into<String>, topics: Vec<Topic>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            topics,
            current_topic_index: 0,
            transcript: Transcript::new(),
            per_topic_scores: Vec::new(),
            final_score: None,
            feedback: None,
            finished: false,
            recorded: false,
            state: ExamState::AwaitingCandidate,
        }
    }

    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn current_topic_index(&self) -> usize {
        self.current_topic_index
    }

    /// The topic under examination, or `None` once every topic is concluded.
    pub fn current_topic(&self) -> Option<&Topic> {
        self.topics.get(self.current_topic_index)
    }

    /// Topics still to come after the current one.
    pub fn remaining_topics(&self) -> &[Topic] {
        let start = (self.current_topic_index + 1).min(self.topics.len());
        &self.topics[start..]
    }

    pub fn all_topics_concluded(&self) -> bool {
        self.current_topic_index >= self.topics.len()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn per_topic_scores(&self) -> &[f64] {
        &self.per_topic_scores
    }

    pub fn final_score(&self) -> Option<f64> {
        self.final_score
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the final result has been durably written.
    pub fn is_recorded(&self) -> bool {
        self.recorded
    }

    /// A finished exam whose result is on disk can be dropped.
    pub fn is_discardable(&self) -> bool {
        self.finished && self.recorded
    }

    pub fn state(&self) -> ExamState {
        self.state
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.current_topic_index,
            total: self.topics.len(),
            current_topic: self.current_topic().cloned(),
        }
    }

    pub(crate) fn push_turn(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    pub(crate) fn set_state(&mut self, state: ExamState) {
        self.state = state;
    }

    /// Scores the current topic and moves to the next one.
    ///
    /// Returns `false` without changing anything if every topic is already
    /// concluded, since the score list may never outgrow the topic list.
    pub(crate) fn conclude_topic(&mut self, score: f64) -> bool {
        if self.all_topics_concluded() {
            return false;
        }
        self.per_topic_scores.push(score);
        self.current_topic_index += 1;
        true
    }

    pub(crate) fn finish(&mut self, final_score: f64, feedback: String) {
        self.final_score = Some(final_score);
        self.feedback = Some(feedback);
        self.finished = true;
    }

    pub(crate) fn mark_recorded(&mut self) {
        self.recorded = true;
    }
}
