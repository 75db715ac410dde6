use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::{AttemptLedger, AttemptStore};
use crate::error::QuizError;
use crate::metrics::ATTEMPT_WRITE_FAILURES_TOTAL;
use crate::models::attempt::QuizAttemptStatus;
use crate::models::{AttemptBackend, AttemptRecord, Question};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Server-side attempt created for a new session.
#[derive(Debug, Clone)]
pub struct RemoteAttempt {
    pub attempt_id: String,
    /// question id -> attempt-question id issued by the server
    pub rows: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct LoadedAttemptQuestion {
    pub row_id: String,
    pub question: Question,
    pub record: AttemptRecord,
}

#[derive(Debug, Clone)]
pub struct RemoteAttemptSnapshot {
    pub attempt_id: String,
    pub user_id: String,
    pub repository_id: String,
    pub status: QuizAttemptStatus,
    /// Ordered by session position.
    pub questions: Vec<LoadedAttemptQuestion>,
}

#[derive(Debug, Clone)]
pub struct AttemptWrite {
    pub idempotency_key: String,
    pub attempt_id: String,
    pub row_id: String,
    pub question_id: String,
    pub record: AttemptRecord,
}

/// Persistence API surface used by the remote attempt store.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn create_attempt(
        &self,
        user_id: &str,
        repository_id: &str,
        question_ids: &[String],
    ) -> anyhow::Result<RemoteAttempt>;

    async fn load_attempt_questions(
        &self,
        attempt_id: &str,
    ) -> anyhow::Result<Option<RemoteAttemptSnapshot>>;

    /// Replaces the attempt-question row; repeating a write converges.
    async fn save_attempt_question(&self, write: &AttemptWrite) -> anyhow::Result<()>;

    /// Most recent answered record per question for this user.
    async fn latest_attempts(
        &self,
        user_id: &str,
        question_ids: &[String],
    ) -> anyhow::Result<HashMap<String, AttemptRecord>>;

    async fn complete_attempt(&self, attempt_id: &str) -> anyhow::Result<()>;
}

pub struct RemoteAttemptStore {
    repository: Arc<dyn AttemptRepository>,
    user_id: String,
    repository_id: String,
    attempt_id: Option<String>,
    rows: HashMap<String, String>,
    ledger: AttemptLedger,
    retry: RetryConfig,
}

impl RemoteAttemptStore {
    pub fn new(
        repository: Arc<dyn AttemptRepository>,
        user_id: impl Into<String>,
        repository_id: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            user_id: user_id.into(),
            repository_id: repository_id.into(),
            attempt_id: None,
            rows: HashMap::new(),
            ledger: AttemptLedger::default(),
            retry: RetryConfig::remote_write(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Rebuilds a store from persisted rows, returning the session's questions in order.
    pub async fn resume(
        repository: Arc<dyn AttemptRepository>,
        user_id: &str,
        attempt_id: &str,
    ) -> Result<(Self, Vec<Question>), QuizError> {
        let snapshot = repository
            .load_attempt_questions(attempt_id)
            .await
            .map_err(QuizError::persistence)?
            .ok_or_else(|| QuizError::SessionNotFound(attempt_id.to_string()))?;

        if snapshot.user_id != user_id {
            return Err(QuizError::Forbidden);
        }
        if snapshot.status == QuizAttemptStatus::Completed {
            return Err(QuizError::SessionCompleted);
        }

        let mut store = Self::new(repository, user_id, snapshot.repository_id);
        store.attempt_id = Some(snapshot.attempt_id);

        let mut records = HashMap::new();
        let mut questions = Vec::with_capacity(snapshot.questions.len());
        for loaded in snapshot.questions {
            store
                .rows
                .insert(loaded.question.id.clone(), loaded.row_id);
            records.insert(loaded.question.id.clone(), loaded.record);
            questions.push(loaded.question);
        }
        store.ledger = AttemptLedger::from_records(records);

        tracing::info!(
            "Resumed remote attempt {} with {} questions",
            attempt_id,
            questions.len()
        );

        Ok((store, questions))
    }

    pub fn attempt_id(&self) -> Option<&str> {
        self.attempt_id.as_deref()
    }

    fn write_failure(&self, question_id: &str, reason: String) -> QuizError {
        ATTEMPT_WRITE_FAILURES_TOTAL
            .with_label_values(&[AttemptBackend::Remote.as_str()])
            .inc();
        tracing::warn!(
            "Remote attempt write failed: attempt={:?}, question={}, error={}",
            self.attempt_id,
            question_id,
            reason
        );
        QuizError::RemoteWriteFailure {
            question_id: question_id.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl AttemptStore for RemoteAttemptStore {
    fn backend(&self) -> AttemptBackend {
        AttemptBackend::Remote
    }

    fn store_key(&self) -> String {
        self.attempt_id.clone().unwrap_or_default()
    }

    async fn history(
        &self,
        question_ids: &[String],
    ) -> Result<HashMap<String, AttemptRecord>, QuizError> {
        self.repository
            .latest_attempts(&self.user_id, question_ids)
            .await
            .map_err(QuizError::persistence)
    }

    async fn begin(&mut self, question_ids: &[String]) -> Result<(), QuizError> {
        let attempt = self
            .repository
            .create_attempt(&self.user_id, &self.repository_id, question_ids)
            .await
            .map_err(QuizError::persistence)?;

        tracing::info!(
            "Created remote attempt {} for user {} ({} questions)",
            attempt.attempt_id,
            self.user_id,
            question_ids.len()
        );

        let mut ledger = AttemptLedger::default();
        ledger.reset(question_ids);
        self.ledger = ledger;
        self.rows = attempt.rows;
        self.attempt_id = Some(attempt.attempt_id);
        Ok(())
    }

    fn get_attempt(&self, question_id: &str) -> Option<&AttemptRecord> {
        self.ledger.records.get(question_id)
    }

    fn attempts(&self) -> &HashMap<String, AttemptRecord> {
        &self.ledger.records
    }

    async fn record_attempt(
        &mut self,
        question_id: &str,
        selected_original_index: usize,
        is_correct: bool,
        response_time_ms: u64,
        answered_at: DateTime<Utc>,
    ) -> Result<(), QuizError> {
        let attempt_id = self
            .attempt_id
            .clone()
            .ok_or(QuizError::SessionNotStarted)?;
        let row_id = match self.rows.get(question_id) {
            Some(row_id) => row_id.clone(),
            None => {
                return Err(self.write_failure(
                    question_id,
                    "question is not part of this attempt".to_string(),
                ))
            }
        };

        let record = self.ledger.next_record(
            selected_original_index,
            is_correct,
            response_time_ms,
            answered_at,
        );
        let write = AttemptWrite {
            idempotency_key: format!("{}:{}", attempt_id, question_id),
            attempt_id,
            row_id,
            question_id: question_id.to_string(),
            record,
        };

        let repository = self.repository.clone();
        let result = retry_async_with_config(self.retry.clone(), || {
            let repository = repository.clone();
            let write = &write;
            async move { repository.save_attempt_question(write).await }
        })
        .await;

        match result {
            Ok(()) => {
                tracing::debug!("Attempt persisted: key={}", write.idempotency_key);
                self.ledger.apply(question_id, write.record);
                Ok(())
            }
            Err(e) => Err(self.write_failure(question_id, format!("{:#}", e))),
        }
    }

    async fn finish(&mut self) -> Result<(), QuizError> {
        if let Some(attempt_id) = &self.attempt_id {
            self.repository
                .complete_attempt(attempt_id)
                .await
                .map_err(QuizError::persistence)?;
        }
        Ok(())
    }
}
