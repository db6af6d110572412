//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources, and the table of exams currently in progress.

use examiner_core::{ExamOrchestrator, Session, StudentRegistry, Topic};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Live exams keyed by id. Each session has its own lock, so exams never
/// wait on each other; only the table itself is shared.
#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl SessionTable {
    pub async fn insert(&self, session: Session) -> (Uuid, Arc<Mutex<Session>>) {
        let id = Uuid::new_v4();
        let slot = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, slot.clone());
        (id, slot)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ExamOrchestrator>,
    pub registry: Arc<StudentRegistry>,
    pub catalog: Arc<Vec<Topic>>,
    pub topics_per_exam: usize,
    pub sessions: Arc<SessionTable>,
}
