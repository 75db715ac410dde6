use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::remote::{
    AttemptRepository, AttemptWrite, LoadedAttemptQuestion, RemoteAttempt, RemoteAttemptSnapshot,
};
use crate::models::attempt::QuizAttemptStatus;
use crate::models::{AttemptRecord, Question};

#[derive(Debug, Clone)]
struct AttemptRow {
    row_id: String,
    question_id: String,
    record: AttemptRecord,
}

#[derive(Debug, Clone)]
struct StoredAttempt {
    user_id: String,
    repository_id: String,
    status: QuizAttemptStatus,
    rows: Vec<AttemptRow>,
}

/// Process-local persistence API, used in tests and when no database is configured.
#[derive(Default)]
pub struct InMemoryAttemptRepository {
    questions: Mutex<HashMap<String, Question>>,
    attempts: Mutex<HashMap<String, StoredAttempt>>,
    fail_writes: AtomicBool,
    write_attempts: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryAttemptRepository {
    pub fn insert_questions(&self, questions: Vec<Question>) {
        if let Ok(mut stored) = self.questions.lock() {
            for question in questions {
                stored.insert(question.id.clone(), question);
            }
        }
    }

    /// Makes every subsequent attempt write fail until switched off.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every write call, including failed ones.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn attempt_status(&self, attempt_id: &str) -> Option<QuizAttemptStatus> {
        self.attempts
            .lock()
            .ok()
            .and_then(|attempts| attempts.get(attempt_id).map(|a| a.status))
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory repository lock poisoned")
}

#[async_trait]
impl AttemptRepository for InMemoryAttemptRepository {
    async fn create_attempt(
        &self,
        user_id: &str,
        repository_id: &str,
        question_ids: &[String],
    ) -> Result<RemoteAttempt> {
        let attempt_id = Uuid::new_v4().to_string();
        let rows: Vec<AttemptRow> = question_ids
            .iter()
            .map(|question_id| AttemptRow {
                row_id: Uuid::new_v4().to_string(),
                question_id: question_id.clone(),
                record: AttemptRecord::unattempted(),
            })
            .collect();
        let row_ids = rows
            .iter()
            .map(|row| (row.question_id.clone(), row.row_id.clone()))
            .collect();

        self.attempts.lock().map_err(poisoned)?.insert(
            attempt_id.clone(),
            StoredAttempt {
                user_id: user_id.to_string(),
                repository_id: repository_id.to_string(),
                status: QuizAttemptStatus::InProgress,
                rows,
            },
        );

        Ok(RemoteAttempt {
            attempt_id,
            rows: row_ids,
        })
    }

    async fn load_attempt_questions(&self, attempt_id: &str) -> Result<Option<RemoteAttemptSnapshot>> {
        let attempt = match self.attempts.lock().map_err(poisoned)?.get(attempt_id) {
            Some(attempt) => attempt.clone(),
            None => return Ok(None),
        };
        let questions = self.questions.lock().map_err(poisoned)?;

        let loaded = attempt
            .rows
            .iter()
            .map(|row| {
                let question = questions
                    .get(&row.question_id)
                    .cloned()
                    .ok_or_else(|| anyhow!("Question {} not found", row.question_id))?;
                Ok(LoadedAttemptQuestion {
                    row_id: row.row_id.clone(),
                    question,
                    record: row.record.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(RemoteAttemptSnapshot {
            attempt_id: attempt_id.to_string(),
            user_id: attempt.user_id,
            repository_id: attempt.repository_id,
            status: attempt.status,
            questions: loaded,
        }))
    }

    async fn save_attempt_question(&self, write: &AttemptWrite) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated write failure"));
        }

        let mut attempts = self.attempts.lock().map_err(poisoned)?;
        let row = attempts
            .get_mut(&write.attempt_id)
            .and_then(|attempt| attempt.rows.iter_mut().find(|row| row.row_id == write.row_id))
            .ok_or_else(|| anyhow!("Attempt question {} not found", write.row_id))?;
        row.record = write.record.clone();

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn latest_attempts(
        &self,
        user_id: &str,
        question_ids: &[String],
    ) -> Result<HashMap<String, AttemptRecord>> {
        let attempts = self.attempts.lock().map_err(poisoned)?;
        let mut latest: HashMap<String, AttemptRecord> = HashMap::new();

        for attempt in attempts.values().filter(|a| a.user_id == user_id) {
            for row in attempt
                .rows
                .iter()
                .filter(|row| row.record.is_attempted && question_ids.contains(&row.question_id))
            {
                let newer = latest
                    .get(&row.question_id)
                    .map(|existing| existing.answered_at < row.record.answered_at)
                    .unwrap_or(true);
                if newer {
                    latest.insert(row.question_id.clone(), row.record.clone());
                }
            }
        }

        Ok(latest)
    }

    async fn complete_attempt(&self, attempt_id: &str) -> Result<()> {
        let mut attempts = self.attempts.lock().map_err(poisoned)?;
        let attempt = attempts
            .get_mut(attempt_id)
            .ok_or_else(|| anyhow!("Attempt {} not found", attempt_id))?;
        attempt.status = QuizAttemptStatus::Completed;
        Ok(())
    }
}
