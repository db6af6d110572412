//! Topic Catalog and Selection
//!
//! Topics are opaque labels drawn from a process-wide catalog. Each exam
//! session samples a handful of them without replacement.

use anyhow::{Context, Result};
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The built-in catalog used when no catalog file is configured.
pub const DEFAULT_CATALOG: &[&str] = &[
    "Python Lists vs Tuples",
    "Generators and Iterators",
    "Decorators in Python",
    "OOP Principles",
    "Dependency Injection",
    "RESTful APIs",
    "Docker Basics",
    "SQL vs NoSQL",
    "Git Branching Strategies",
    "CI/CD Pipelines",
];

/// A named subject area the candidate is examined on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("Cannot select {requested} topics from a catalog of {available}")]
    InvalidSampleSize { requested: usize, available: usize },
}

/// Returns the built-in catalog as owned topics.
pub fn default_catalog() -> Vec<Topic> {
    DEFAULT_CATALOG.iter().copied().map(Topic::from).collect()
}

/// Loads a catalog from a file with one topic per line.
///
/// Blank lines are skipped and surrounding whitespace is trimmed. An empty
/// catalog is rejected since no exam could ever be drawn from it.
pub fn load_catalog(path: &Path) -> Result<Vec<Topic>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topic catalog {}", path.display()))?;
    let topics: Vec<Topic> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Topic::from)
        .collect();
    anyhow::ensure!(
        !topics.is_empty(),
        "Topic catalog {} contains no topics",
        path.display()
    );
    Ok(topics)
}

/// Draws `k` distinct topics from `catalog`, uniformly and without replacement.
///
/// The relative order of the result carries no meaning. The randomness source
/// is supplied by the caller so tests can pass a seeded generator.
pub fn select_topics<R: Rng + ?Sized>(
    catalog: &[Topic],
    k: usize,
    rng: &mut R,
) -> Result<Vec<Topic>, TopicError> {
    if k > catalog.len() {
        return Err(TopicError::InvalidSampleSize {
            requested: k,
            available: catalog.len(),
        });
    }
    Ok(rand::seq::index::sample(rng, catalog.len(), k)
        .into_iter()
        .map(|i| catalog[i].clone())
        .collect())
}
