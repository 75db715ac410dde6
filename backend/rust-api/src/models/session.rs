use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::attempt::{AttemptBackend, AttemptState};
use super::trophy::{TrophyEvaluation, TrophyType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// Pure projection of a session's attempt state; never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedStats {
    pub total: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub unanswered: u32,
    pub accuracy_percent: u32,
    pub progress_percent: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub average_response_time_ms: u64,
    pub had_comeback: bool,
    /// Sum and count behind the rounded average.
    #[serde(skip)]
    pub total_response_time_ms: u64,
    #[serde(skip)]
    pub timed_answers: u32,
}

impl DerivedStats {
    pub fn answered(&self) -> u32 {
        self.correct + self.incorrect
    }

    /// Exact mean response time is strictly below `threshold_ms`.
    /// True when no answer carries a time.
    pub fn mean_response_time_below(&self, threshold_ms: u64) -> bool {
        self.timed_answers == 0
            || self.total_response_time_ms
                < threshold_ms.saturating_mul(self.timed_answers as u64)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(length(min = 1, max = 128))]
    pub repository_id: String,
    /// Empty means the full question set.
    #[serde(default)]
    #[validate(length(max = 3))]
    pub filter: Vec<AttemptState>,
    #[serde(default)]
    pub backend: Option<AttemptBackend>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResumeSessionRequest {
    /// Remote attempt to rebuild from persisted rows.
    #[validate(length(min = 1, max = 128))]
    pub attempt_id: Option<String>,
    /// Repository whose locally stored attempt state is resumed.
    #[validate(length(min = 1, max = 128))]
    pub repository_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SelectAnswerRequest {
    #[validate(range(max = 64))]
    pub display_index: usize,
}

/// The current question as shown to the user, options in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub body: String,
    pub options: Vec<String>,
    pub selected_display_index: Option<usize>,
    pub answered: bool,
    pub is_correct: Option<bool>,
    pub correct_display_index: Option<usize>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub status: SessionStatus,
    pub backend: AttemptBackend,
    /// Key to resume under: remote attempt id or local repository id.
    pub store_key: String,
    pub position: usize,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub question: Option<QuestionView>,
    pub stats: DerivedStats,
    pub trophies: TrophyEvaluation,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub question_id: String,
    pub selected_original_index: usize,
    pub is_correct: bool,
    pub response_time_ms: u64,
    pub already_answered: bool,
    pub newly_unlocked: Vec<TrophyType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionSummary {
    pub session_id: String,
    pub backend: AttemptBackend,
    /// Remote attempt id or local repository id under which attempts remain.
    pub store_key: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub stats: DerivedStats,
    pub unlocked: Vec<TrophyType>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Navigation {
    Moved { position: usize },
    Completed { summary: CompletionSummary },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_defaults_to_full_set() {
        let req: StartSessionRequest =
            serde_json::from_str(r#"{"repository_id":"repo-1"}"#).unwrap();
        assert!(req.filter.is_empty());
        assert!(req.backend.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn start_request_rejects_empty_repository() {
        let req: StartSessionRequest =
            serde_json::from_str(r#"{"repository_id":"","filter":["incorrect"]}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
