use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::{AttemptLedger, AttemptStore, KeyValueStorage};
use crate::error::QuizError;
use crate::metrics::ATTEMPT_WRITE_FAILURES_TOTAL;
use crate::models::{AttemptBackend, AttemptRecord};

/// Snapshots are scoped per user and repository.
pub fn storage_key(user_id: &str, repository_id: &str) -> String {
    format!("quiz_attempts:{}:{}", user_id, repository_id)
}

/// Everything persisted under one user/repository key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalSnapshot {
    #[serde(flatten)]
    pub ledger: AttemptLedger,
    /// Questions of the session in progress, in position order. Empty once finished.
    #[serde(default)]
    pub session_question_ids: Vec<String>,
}

pub struct LocalAttemptStore {
    user_id: String,
    repository_id: String,
    storage: Arc<dyn KeyValueStorage>,
    snapshot: LocalSnapshot,
}

impl LocalAttemptStore {
    pub async fn open(
        storage: Arc<dyn KeyValueStorage>,
        user_id: impl Into<String>,
        repository_id: impl Into<String>,
    ) -> Result<Self, QuizError> {
        let user_id = user_id.into();
        let repository_id = repository_id.into();
        let key = storage_key(&user_id, &repository_id);

        let raw = storage
            .get(&key)
            .await
            .map_err(|e| QuizError::StorageFailure(format!("{:#}", e)))?;
        let snapshot = match raw {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                QuizError::StorageFailure(format!("corrupt snapshot under {}: {}", key, e))
            })?,
            None => LocalSnapshot::default(),
        };

        tracing::debug!(
            "Opened local attempt store {} ({} records, storage={})",
            key,
            snapshot.ledger.records.len(),
            storage.kind()
        );

        Ok(Self {
            user_id,
            repository_id,
            storage,
            snapshot,
        })
    }

    pub fn session_question_ids(&self) -> &[String] {
        &self.snapshot.session_question_ids
    }

    /// Persists `next` and only then makes it the current snapshot.
    async fn commit(&mut self, next: LocalSnapshot) -> Result<(), QuizError> {
        let key = storage_key(&self.user_id, &self.repository_id);
        let persisted = match serde_json::to_string(&next) {
            Ok(json) => self.storage.set(&key, &json).await,
            Err(e) => Err(e.into()),
        };

        match persisted {
            Ok(()) => {
                self.snapshot = next;
                Ok(())
            }
            Err(e) => {
                ATTEMPT_WRITE_FAILURES_TOTAL
                    .with_label_values(&[AttemptBackend::Local.as_str()])
                    .inc();
                tracing::warn!("Local attempt write failed: key={}, error={:#}", key, e);
                Err(QuizError::StorageFailure(format!("{:#}", e)))
            }
        }
    }
}

#[async_trait]
impl AttemptStore for LocalAttemptStore {
    fn backend(&self) -> AttemptBackend {
        AttemptBackend::Local
    }

    fn store_key(&self) -> String {
        self.repository_id.clone()
    }

    async fn history(
        &self,
        question_ids: &[String],
    ) -> Result<HashMap<String, AttemptRecord>, QuizError> {
        Ok(self.snapshot.ledger.history(question_ids))
    }

    async fn begin(&mut self, question_ids: &[String]) -> Result<(), QuizError> {
        let mut next = self.snapshot.clone();
        next.ledger.reset(question_ids);
        next.session_question_ids = question_ids.to_vec();
        self.commit(next).await
    }

    fn get_attempt(&self, question_id: &str) -> Option<&AttemptRecord> {
        self.snapshot.ledger.records.get(question_id)
    }

    fn attempts(&self) -> &HashMap<String, AttemptRecord> {
        &self.snapshot.ledger.records
    }

    async fn record_attempt(
        &mut self,
        question_id: &str,
        selected_original_index: usize,
        is_correct: bool,
        response_time_ms: u64,
        answered_at: DateTime<Utc>,
    ) -> Result<(), QuizError> {
        let mut next = self.snapshot.clone();
        let record = next.ledger.next_record(
            selected_original_index,
            is_correct,
            response_time_ms,
            answered_at,
        );
        next.ledger.apply(question_id, record);
        self.commit(next).await
    }

    async fn finish(&mut self) -> Result<(), QuizError> {
        let mut next = self.snapshot.clone();
        next.session_question_ids.clear();
        self.commit(next).await
    }
}
