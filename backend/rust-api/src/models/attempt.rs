use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Per-question attempt state within one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub is_attempted: bool,
    pub selected_original_index: Option<usize>,
    pub is_correct: Option<bool>,
    pub response_time_ms: Option<u64>,
    /// 1-based submission ordinal; streaks follow this, not question order.
    #[serde(default)]
    pub answered_seq: Option<u64>,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    pub fn unattempted() -> Self {
        Self::default()
    }

    pub fn answered(
        selected_original_index: usize,
        is_correct: bool,
        response_time_ms: u64,
        answered_seq: u64,
        answered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            is_attempted: true,
            selected_original_index: Some(selected_original_index),
            is_correct: Some(is_correct),
            response_time_ms: Some(response_time_ms),
            answered_seq: Some(answered_seq),
            answered_at: Some(answered_at),
        }
    }

    pub fn state(&self) -> AttemptState {
        match (self.is_attempted, self.is_correct) {
            (true, Some(true)) => AttemptState::Correct,
            (true, _) => AttemptState::Incorrect,
            (false, _) => AttemptState::Unanswered,
        }
    }
}

/// Attempt-state filter used to pick a session's question subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Unanswered,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptBackend {
    Remote,
    Local,
}

impl AttemptBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptBackend::Remote => "remote",
            AttemptBackend::Local => "local",
        }
    }
}

impl FromStr for AttemptBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "remote" | "online" => Ok(AttemptBackend::Remote),
            "local" | "offline" => Ok(AttemptBackend::Local),
            _ => Err(format!("Invalid attempt backend: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizAttemptStatus {
    InProgress,
    Completed,
}

/// `quiz_attempts` row: one per remote attempt session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttemptDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub repository_id: String,
    pub status: QuizAttemptStatus,
    pub created_at: mongodb::bson::DateTime,
    #[serde(default)]
    pub completed_at: Option<mongodb::bson::DateTime>,
}

/// `quiz_attempt_questions` row, keyed by a server-issued id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptQuestionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub attempt_id: String,
    pub user_id: String,
    pub question_id: String,
    pub position: i32,
    pub is_attempted: bool,
    #[serde(default)]
    pub selected_original_index: Option<i32>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub response_time_ms: Option<i64>,
    #[serde(default)]
    pub answered_seq: Option<i64>,
    #[serde(default)]
    pub answered_at: Option<mongodb::bson::DateTime>,
}

impl AttemptQuestionDocument {
    pub fn record(&self) -> AttemptRecord {
        AttemptRecord {
            is_attempted: self.is_attempted,
            selected_original_index: self
                .selected_original_index
                .and_then(|index| usize::try_from(index).ok()),
            is_correct: self.is_correct,
            response_time_ms: self
                .response_time_ms
                .and_then(|ms| u64::try_from(ms).ok()),
            answered_seq: self.answered_seq.and_then(|seq| u64::try_from(seq).ok()),
            answered_at: self.answered_at.map(crate::utils::time::bson_to_chrono),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_state_follows_correctness() {
        assert_eq!(AttemptRecord::unattempted().state(), AttemptState::Unanswered);

        let now = Utc::now();
        assert_eq!(
            AttemptRecord::answered(1, true, 100, 1, now).state(),
            AttemptState::Correct
        );
        assert_eq!(
            AttemptRecord::answered(1, false, 100, 2, now).state(),
            AttemptState::Incorrect
        );
    }

    #[test]
    fn backend_parses_aliases() {
        assert_eq!("remote".parse::<AttemptBackend>(), Ok(AttemptBackend::Remote));
        assert_eq!(" LOCAL ".parse::<AttemptBackend>(), Ok(AttemptBackend::Local));
        assert_eq!("offline".parse::<AttemptBackend>(), Ok(AttemptBackend::Local));
        assert!("cloud".parse::<AttemptBackend>().is_err());
    }

    #[test]
    fn filter_state_uses_snake_case() {
        let states: Vec<AttemptState> =
            serde_json::from_str(r#"["unanswered","incorrect"]"#).unwrap();
        assert_eq!(states, vec![AttemptState::Unanswered, AttemptState::Incorrect]);
    }

    #[test]
    fn document_rejects_negative_indices() {
        let doc = AttemptQuestionDocument {
            id: "row".to_string(),
            attempt_id: "a".to_string(),
            user_id: "u".to_string(),
            question_id: "q".to_string(),
            position: 0,
            is_attempted: true,
            selected_original_index: Some(-1),
            is_correct: Some(false),
            response_time_ms: Some(250),
            answered_seq: Some(1),
            answered_at: None,
        };

        let record = doc.record();
        assert_eq!(record.selected_original_index, None);
        assert_eq!(record.response_time_ms, Some(250));
    }
}
