//! Attempt stores: one contract, a remote and a local backend.
//!
//! A store only updates its in-memory records after the backing write has
//! succeeded. A dropped or failed write leaves the record untouched, so the
//! visible state never runs ahead of what was persisted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::QuizError;
use crate::models::{AttemptBackend, AttemptRecord};

pub mod local;
pub mod memory;
pub mod mongo;
pub mod remote;
pub mod storage;

pub use local::LocalAttemptStore;
pub use remote::{AttemptRepository, RemoteAttemptStore};
pub use storage::KeyValueStorage;

#[async_trait]
pub trait AttemptStore: Send + Sync {
    fn backend(&self) -> AttemptBackend;

    /// Remote attempt id or local repository id.
    fn store_key(&self) -> String;

    /// Outcomes recorded before the current session, used to pick its subset.
    async fn history(
        &self,
        question_ids: &[String],
    ) -> Result<HashMap<String, AttemptRecord>, QuizError>;

    /// Creates unattempted records for a new session's questions.
    async fn begin(&mut self, question_ids: &[String]) -> Result<(), QuizError>;

    fn get_attempt(&self, question_id: &str) -> Option<&AttemptRecord>;

    fn attempts(&self) -> &HashMap<String, AttemptRecord>;

    /// Last write wins when called twice for the same question.
    async fn record_attempt(
        &mut self,
        question_id: &str,
        selected_original_index: usize,
        is_correct: bool,
        response_time_ms: u64,
        answered_at: DateTime<Utc>,
    ) -> Result<(), QuizError>;

    async fn finish(&mut self) -> Result<(), QuizError>;
}

/// Keyed attempt records plus the submission counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptLedger {
    pub records: HashMap<String, AttemptRecord>,
    pub next_seq: u64,
}

impl AttemptLedger {
    pub fn from_records(records: HashMap<String, AttemptRecord>) -> Self {
        let next_seq = records
            .values()
            .filter_map(|record| record.answered_seq)
            .max()
            .unwrap_or(0);
        Self { records, next_seq }
    }

    pub fn reset(&mut self, question_ids: &[String]) {
        for id in question_ids {
            self.records
                .insert(id.clone(), AttemptRecord::unattempted());
        }
    }

    /// Builds the record for the next submission without mutating the ledger.
    pub fn next_record(
        &self,
        selected_original_index: usize,
        is_correct: bool,
        response_time_ms: u64,
        answered_at: DateTime<Utc>,
    ) -> AttemptRecord {
        AttemptRecord::answered(
            selected_original_index,
            is_correct,
            response_time_ms,
            self.next_seq + 1,
            answered_at,
        )
    }

    pub fn apply(&mut self, question_id: &str, record: AttemptRecord) {
        if let Some(seq) = record.answered_seq {
            self.next_seq = self.next_seq.max(seq);
        }
        self.records.insert(question_id.to_string(), record);
    }

    pub fn history(&self, question_ids: &[String]) -> HashMap<String, AttemptRecord> {
        question_ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|record| (id.clone(), record.clone())))
            .collect()
    }
}
