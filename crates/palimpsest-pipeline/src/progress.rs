//! Append-only progress log
//!
//! Human-readable stage-transition messages for progress UI. The log is an
//! observable side effect only; nothing in the pipeline reads it back, so it
//! must never be required for correctness.

use crate::run::RunId;
use crate::stage::Stage;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One progress entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Append time
    pub timestamp: DateTime<Utc>,
    /// Run the entry belongs to
    pub run_id: RunId,
    /// Stage the pipeline was in when the entry was appended
    pub stage: Stage,
    /// Human-readable message
    pub message: String,
}

/// Monotonically-appended log of progress entries
#[derive(Debug, Default)]
pub struct ProgressLog {
    inner: Mutex<Vec<ProgressEntry>>,
}

impl ProgressLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn append(&self, run_id: RunId, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(%run_id, %stage, "{message}");
        self.inner.lock().push(ProgressEntry {
            timestamp: Utc::now(),
            run_id,
            stage,
            message,
        });
    }

    /// Snapshot of all entries in append order
    #[must_use]
    pub fn entries(&self) -> Vec<ProgressEntry> {
        self.inner.lock().clone()
    }

    /// Snapshot of one run's entries in append order
    #[must_use]
    pub fn entries_for(&self, run_id: RunId) -> Vec<ProgressEntry> {
        self.inner
            .lock()
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
