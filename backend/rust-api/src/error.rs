use crate::models::session::SessionStatus;

/// Failures surfaced by the quiz-attempt engine.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("No questions match the selected filter")]
    EmptySelection,

    #[error("Failed to persist attempt for question {question_id}: {reason}")]
    RemoteWriteFailure { question_id: String, reason: String },

    #[error("Local attempt storage failed: {0}")]
    StorageFailure(String),

    #[error("Index {index} is outside a permutation of {len} options")]
    InvalidScrambleState { index: usize, len: usize },

    #[error("Option {index} does not exist on a question with {len} options")]
    InvalidOption { index: usize, len: usize },

    #[error("No answer selected")]
    NoAnswerSelected,

    #[error("Session has not been started")]
    SessionNotStarted,

    #[error("Session is already in progress")]
    SessionAlreadyStarted,

    #[error("Session is already completed")]
    SessionCompleted,

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session belongs to another user")]
    Forbidden,

    #[error("Failed to load quiz data: {0}")]
    Persistence(String),
}

impl QuizError {
    /// Maps a lifecycle status to the error returned when an action needs `InProgress`.
    pub fn not_in_progress(status: SessionStatus) -> Self {
        match status {
            SessionStatus::NotStarted => QuizError::SessionNotStarted,
            SessionStatus::InProgress => QuizError::SessionAlreadyStarted,
            SessionStatus::Completed => QuizError::SessionCompleted,
        }
    }

    pub fn persistence(err: anyhow::Error) -> Self {
        QuizError::Persistence(format!("{:#}", err))
    }
}
