//! Result Recording and Student Registry
//!
//! Both stores keep a JSON array in a single file and rewrite the whole file
//! on every write. Writers to the same store are serialized by an async
//! mutex; readers see the last completed write.

use crate::transcript::{Transcript, Turn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const STUDENTS_FILE: &str = "students.json";
pub const RESULTS_FILE: &str = "results.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} does not contain a valid record list: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// An ordered list of records persisted as one JSON file.
pub struct JsonFileStore<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _records: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _records: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record. A missing file is an empty store.
    pub async fn load(&self) -> Result<Vec<T>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, records: &[T]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StorageError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }
        let json = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| StorageError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Appends a record after all existing ones.
    pub async fn append(&self, record: T) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        records.push(record);
        self.save(&records).await
    }

    /// Appends `record` only if no existing record satisfies `exists`.
    ///
    /// Returns whether the record was written.
    pub async fn append_if_absent<F>(&self, record: T, exists: F) -> Result<bool, StorageError>
    where
        F: Fn(&T) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        if records.iter().any(exists) {
            return Ok(false);
        }
        records.push(record);
        self.save(&records).await?;
        Ok(true)
    }
}

// --- Records ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub email: String,
    pub name: String,
    pub registered_at: DateTime<Utc>,
}

/// Storage-normalized speaker of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    System,
    User,
    ToolCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub email: String,
    pub score: f64,
    pub history: Vec<HistoryEntry>,
    pub completed_at: DateTime<Utc>,
}

/// Flattens a transcript into stored history entries.
///
/// Every entry is stamped with `written_at` rather than the time the turn
/// happened; only the order of turns survives.
pub fn history_entries(
    transcript: &Transcript,
    written_at: DateTime<Utc>,
) -> Result<Vec<HistoryEntry>, StorageError> {
    transcript
        .iter()
        .map(|turn| -> Result<HistoryEntry, StorageError> {
            let (role, content) = match turn {
                Turn::User { text } => (HistoryRole::User, text.clone()),
                Turn::AgentText { text } => (HistoryRole::System, text.clone()),
                Turn::AgentToolCall { calls } => {
                    (HistoryRole::System, serde_json::to_string(calls)?)
                }
                Turn::ToolResult { text, .. } => (HistoryRole::ToolCall, text.clone()),
            };
            Ok(HistoryEntry {
                role,
                content,
                datetime: written_at,
            })
        })
        .collect()
}

/// Persists the outcome of a finished exam.
#[async_trait]
pub trait ResultRecorder: Send + Sync {
    async fn record(
        &self,
        candidate_id: &str,
        final_score: f64,
        transcript: &Transcript,
    ) -> Result<(), StorageError>;
}

/// Append-only result log backed by `results.json`.
pub struct JsonResultLog {
    store: JsonFileStore<ResultRecord>,
}

impl JsonResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonFileStore::new(path),
        }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(RESULTS_FILE))
    }

    pub async fn results(&self) -> Result<Vec<ResultRecord>, StorageError> {
        self.store.load().await
    }
}

#[async_trait]
impl ResultRecorder for JsonResultLog {
    async fn record(
        &self,
        candidate_id: &str,
        final_score: f64,
        transcript: &Transcript,
    ) -> Result<(), StorageError> {
        let now = Utc::now();
        let record = ResultRecord {
            email: candidate_id.to_string(),
            score: final_score,
            history: history_entries(transcript, now)?,
            completed_at: now,
        };
        self.store.append(record).await?;
        info!(candidate = %candidate_id, score = final_score, path = %self.store.path().display(), "Exam result recorded");
        Ok(())
    }
}

/// Registry of candidates keyed by email, backed by `students.json`.
pub struct StudentRegistry {
    store: JsonFileStore<StudentRecord>,
}

impl StudentRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonFileStore::new(path),
        }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(STUDENTS_FILE))
    }

    /// Registers a candidate unless the email is already known.
    ///
    /// Returns `true` if a new record was written.
    pub async fn register(&self, email: &str, name: &str) -> Result<bool, StorageError> {
        let record = StudentRecord {
            email: email.to_string(),
            name: name.to_string(),
            registered_at: Utc::now(),
        };
        let added = self
            .store
            .append_if_absent(record, |existing| existing.email == email)
            .await?;
        debug!(candidate = %email, added, "Student registration processed");
        Ok(added)
    }

    pub async fn students(&self) -> Result<Vec<StudentRecord>, StorageError> {
        self.store.load().await
    }
}
