use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use std::sync::Mutex;

use crate::metrics::track_db_operation;
use crate::models::question::QuestionDocument;
use crate::models::Question;

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Questions of a repository in their stored order.
    async fn questions_for_repository(&self, repository_id: &str) -> Result<Vec<Question>>;
}

pub struct MongoQuestionRepository {
    mongo: Database,
}

impl MongoQuestionRepository {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl QuestionRepository for MongoQuestionRepository {
    async fn questions_for_repository(&self, repository_id: &str) -> Result<Vec<Question>> {
        let collection = self.mongo.collection::<QuestionDocument>("questions");

        let documents: Vec<QuestionDocument> = track_db_operation("find", "questions", async {
            collection
                .find(doc! {
                    "$or": [
                        { "repository_id": repository_id },
                        { "resource_repository_id": repository_id },
                    ]
                })
                .sort(doc! { "_id": 1 })
                .await
                .context("Failed to query questions")?
                .try_collect()
                .await
                .context("Question cursor error")
        })
        .await?;

        tracing::debug!(
            "Loaded {} questions for repository {}",
            documents.len(),
            repository_id
        );

        Ok(documents.into_iter().map(Question::from).collect())
    }
}

/// Question bank held in process memory.
#[derive(Default)]
pub struct InMemoryQuestionRepository {
    questions: Mutex<Vec<Question>>,
}

impl InMemoryQuestionRepository {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions: Mutex::new(questions),
        }
    }

    pub fn insert(&self, question: Question) {
        if let Ok(mut questions) = self.questions.lock() {
            questions.push(question);
        }
    }
}

#[async_trait]
impl QuestionRepository for InMemoryQuestionRepository {
    async fn questions_for_repository(&self, repository_id: &str) -> Result<Vec<Question>> {
        let questions = self
            .questions
            .lock()
            .map_err(|_| anyhow::anyhow!("question bank lock poisoned"))?;
        Ok(questions
            .iter()
            .filter(|q| q.repository_id.as_deref() == Some(repository_id))
            .cloned()
            .collect())
    }
}
