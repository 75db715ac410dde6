use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use std::collections::HashMap;
use uuid::Uuid;

use super::remote::{
    AttemptRepository, AttemptWrite, LoadedAttemptQuestion, RemoteAttempt, RemoteAttemptSnapshot,
};
use crate::metrics::track_db_operation;
use crate::models::attempt::{AttemptQuestionDocument, QuizAttemptDocument, QuizAttemptStatus};
use crate::models::question::QuestionDocument;
use crate::models::{AttemptRecord, Question};
use crate::utils::time::chrono_to_bson;

const ATTEMPTS: &str = "quiz_attempts";
const ATTEMPT_QUESTIONS: &str = "quiz_attempt_questions";
const QUESTIONS: &str = "questions";

pub struct MongoAttemptRepository {
    mongo: Database,
}

impl MongoAttemptRepository {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn attempts(&self) -> Collection<QuizAttemptDocument> {
        self.mongo.collection(ATTEMPTS)
    }

    fn attempt_questions(&self) -> Collection<AttemptQuestionDocument> {
        self.mongo.collection(ATTEMPT_QUESTIONS)
    }

    fn questions(&self) -> Collection<QuestionDocument> {
        self.mongo.collection(QUESTIONS)
    }
}

fn to_i64(value: u64) -> Option<i64> {
    i64::try_from(value).ok()
}

#[async_trait]
impl AttemptRepository for MongoAttemptRepository {
    async fn create_attempt(
        &self,
        user_id: &str,
        repository_id: &str,
        question_ids: &[String],
    ) -> Result<RemoteAttempt> {
        let attempt_id = Uuid::new_v4().to_string();
        let now = chrono_to_bson(Utc::now());

        let attempt = QuizAttemptDocument {
            id: attempt_id.clone(),
            user_id: user_id.to_string(),
            repository_id: repository_id.to_string(),
            status: QuizAttemptStatus::InProgress,
            created_at: now,
            completed_at: None,
        };

        let rows: Vec<AttemptQuestionDocument> = question_ids
            .iter()
            .enumerate()
            .map(|(position, question_id)| AttemptQuestionDocument {
                id: Uuid::new_v4().to_string(),
                attempt_id: attempt_id.clone(),
                user_id: user_id.to_string(),
                question_id: question_id.clone(),
                position: position as i32,
                is_attempted: false,
                selected_original_index: None,
                is_correct: None,
                response_time_ms: None,
                answered_seq: None,
                answered_at: None,
            })
            .collect();

        track_db_operation("insert_one", ATTEMPTS, async {
            self.attempts()
                .insert_one(&attempt)
                .await
                .map(|_| ())
                .context("Failed to insert quiz attempt")
        })
        .await?;

        if !rows.is_empty() {
            track_db_operation("insert_many", ATTEMPT_QUESTIONS, async {
                self.attempt_questions()
                    .insert_many(&rows)
                    .await
                    .map(|_| ())
                    .context("Failed to insert attempt questions")
            })
            .await?;
        }

        Ok(RemoteAttempt {
            attempt_id,
            rows: rows
                .into_iter()
                .map(|row| (row.question_id, row.id))
                .collect(),
        })
    }

    async fn load_attempt_questions(&self, attempt_id: &str) -> Result<Option<RemoteAttemptSnapshot>> {
        let attempt = track_db_operation("find_one", ATTEMPTS, async {
            self.attempts()
                .find_one(doc! { "_id": attempt_id })
                .await
                .context("Failed to query quiz attempt")
        })
        .await?;
        let Some(attempt) = attempt else {
            return Ok(None);
        };

        let rows: Vec<AttemptQuestionDocument> =
            track_db_operation("find", ATTEMPT_QUESTIONS, async {
                self.attempt_questions()
                    .find(doc! { "attempt_id": attempt_id })
                    .sort(doc! { "position": 1 })
                    .await
                    .context("Failed to query attempt questions")?
                    .try_collect()
                    .await
                    .context("Attempt question cursor error")
            })
            .await?;

        let question_ids: Vec<&str> = rows.iter().map(|row| row.question_id.as_str()).collect();
        let documents: Vec<QuestionDocument> = track_db_operation("find", QUESTIONS, async {
            self.questions()
                .find(doc! { "_id": { "$in": question_ids } })
                .await
                .context("Failed to query questions")?
                .try_collect()
                .await
                .context("Question cursor error")
        })
        .await?;
        let mut questions: HashMap<String, Question> = documents
            .into_iter()
            .map(|doc| (doc.id.clone(), Question::from(doc)))
            .collect();

        let loaded = rows
            .iter()
            .map(|row| {
                let question = questions
                    .remove(&row.question_id)
                    .ok_or_else(|| anyhow!("Question {} not found", row.question_id))?;
                Ok(LoadedAttemptQuestion {
                    row_id: row.id.clone(),
                    question,
                    record: row.record(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(RemoteAttemptSnapshot {
            attempt_id: attempt.id,
            user_id: attempt.user_id,
            repository_id: attempt.repository_id,
            status: attempt.status,
            questions: loaded,
        }))
    }

    async fn save_attempt_question(&self, write: &AttemptWrite) -> Result<()> {
        let record = &write.record;
        let update = doc! {
            "$set": {
                "is_attempted": record.is_attempted,
                "selected_original_index": record.selected_original_index.map(|i| i as i32),
                "is_correct": record.is_correct,
                "response_time_ms": record.response_time_ms.and_then(to_i64),
                "answered_seq": record.answered_seq.and_then(to_i64),
                "answered_at": record.answered_at.map(chrono_to_bson),
            }
        };

        let result = track_db_operation("update_one", ATTEMPT_QUESTIONS, async {
            self.attempt_questions()
                .update_one(
                    doc! { "_id": &write.row_id, "attempt_id": &write.attempt_id },
                    update,
                )
                .await
                .context("Failed to update attempt question")
        })
        .await?;

        if result.matched_count == 0 {
            return Err(anyhow!(
                "Attempt question {} not found (key {})",
                write.row_id,
                write.idempotency_key
            ));
        }
        Ok(())
    }

    async fn latest_attempts(
        &self,
        user_id: &str,
        question_ids: &[String],
    ) -> Result<HashMap<String, AttemptRecord>> {
        let rows: Vec<AttemptQuestionDocument> =
            track_db_operation("find", ATTEMPT_QUESTIONS, async {
                self.attempt_questions()
                    .find(doc! {
                        "user_id": user_id,
                        "is_attempted": true,
                        "question_id": { "$in": question_ids },
                    })
                    .sort(doc! { "answered_at": -1 })
                    .await
                    .context("Failed to query attempt history")?
                    .try_collect()
                    .await
                    .context("Attempt history cursor error")
            })
            .await?;

        let mut latest = HashMap::new();
        for row in rows {
            latest
                .entry(row.question_id.clone())
                .or_insert_with(|| row.record());
        }
        Ok(latest)
    }

    async fn complete_attempt(&self, attempt_id: &str) -> Result<()> {
        track_db_operation("update_one", ATTEMPTS, async {
            self.attempts()
                .update_one(
                    doc! { "_id": attempt_id },
                    doc! { "$set": {
                        "status": "completed",
                        "completed_at": chrono_to_bson(Utc::now()),
                    }},
                )
                .await
                .map(|_| ())
                .context("Failed to complete quiz attempt")
        })
        .await
    }
}
