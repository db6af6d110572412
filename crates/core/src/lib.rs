//! Core of the automated oral examiner: topic selection, session state, the
//! model adapter, the orchestration state machine, and result storage.

pub mod agent;
pub mod llm_client;
pub mod orchestrator;
pub mod recorder;
pub mod session;
pub mod tools;
pub mod topic;
pub mod transcript;

pub use agent::{AdapterError, AgentReply, ExamAgent, ExaminerAgent};
pub use orchestrator::{ExamError, ExamOrchestrator, OrchestratorSettings};
pub use recorder::{JsonResultLog, ResultRecorder, StorageError, StudentRegistry};
pub use session::{ExamState, Progress, Session};
pub use topic::{Topic, TopicError, select_topics};
pub use transcript::{Transcript, Turn};
