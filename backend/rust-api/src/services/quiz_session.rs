//! Quiz session controller.
//!
//! Drives one attempt session through `NotStarted -> InProgress -> Completed`,
//! wiring scrambler, attempt store, stats and trophies together. The session
//! owns its scramble maps and pending selections; attempt records live in
//! the store and change only after a confirmed write.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::attempt_store::AttemptStore;
use super::scrambler::{self, ScrambleMap};
use super::stats::compute_stats;
use super::trophies;
use crate::error::QuizError;
use crate::metrics::{
    ANSWERS_SUBMITTED_TOTAL, SESSIONS_ACTIVE, SESSIONS_TOTAL, TROPHIES_UNLOCKED_TOTAL,
};
use crate::models::attempt::AttemptState;
use crate::models::session::{
    CompletionSummary, Navigation, QuestionView, SessionView, SubmitOutcome,
};
use crate::models::trophy::{HalfwayCheckpoint, SessionSignals};
use crate::models::{AttemptBackend, DerivedStats, Question, SessionStatus, TrophyType};
use crate::utils::time::{elapsed_ms, Clock};

/// Produces the option permutation for a question with `n` options.
pub type ScrambleSource = Arc<dyn Fn(usize) -> ScrambleMap + Send + Sync>;

pub struct QuizSession {
    id: String,
    user_id: String,
    status: SessionStatus,
    questions: Vec<Question>,
    position: usize,
    scrambles: HashMap<String, ScrambleMap>,
    /// Display index chosen but not yet submitted.
    pending: HashMap<String, usize>,
    /// When each question was first shown; response time counts from here.
    shown_at: HashMap<String, DateTime<Utc>>,
    started_at: DateTime<Utc>,
    halfway: HalfwayCheckpoint,
    unlocked: BTreeSet<TrophyType>,
    store: Box<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    scramble_source: ScrambleSource,
}

impl QuizSession {
    pub fn new(
        user_id: impl Into<String>,
        store: Box<dyn AttemptStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            status: SessionStatus::NotStarted,
            questions: Vec::new(),
            position: 0,
            scrambles: HashMap::new(),
            pending: HashMap::new(),
            shown_at: HashMap::new(),
            started_at,
            halfway: HalfwayCheckpoint::Pending,
            unlocked: BTreeSet::new(),
            store,
            clock,
            scramble_source: Arc::new(scrambler::generate),
        }
    }

    pub fn with_scramble_source(mut self, source: ScrambleSource) -> Self {
        self.scramble_source = source;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn backend(&self) -> AttemptBackend {
        self.store.backend()
    }

    pub fn store_key(&self) -> String {
        self.store.store_key()
    }

    /// Selects the questions whose prior state matches `filter` (all of them
    /// when `filter` is empty) and starts the session at position 0.
    pub async fn start(
        &mut self,
        question_set: Vec<Question>,
        filter: &[AttemptState],
    ) -> Result<(), QuizError> {
        match self.status {
            SessionStatus::NotStarted => {}
            SessionStatus::InProgress => return Err(QuizError::SessionAlreadyStarted),
            SessionStatus::Completed => return Err(QuizError::SessionCompleted),
        }

        let all_ids: Vec<String> = question_set.iter().map(|q| q.id.clone()).collect();
        let history = self.store.history(&all_ids).await?;

        let selected: Vec<Question> = question_set
            .into_iter()
            .filter(|question| {
                filter.is_empty() || {
                    let state = history
                        .get(&question.id)
                        .map(|record| record.state())
                        .unwrap_or(AttemptState::Unanswered);
                    filter.contains(&state)
                }
            })
            .collect();

        if selected.is_empty() {
            tracing::info!(
                "No questions match filter {:?} for user {}",
                filter,
                self.user_id
            );
            return Err(QuizError::EmptySelection);
        }

        let selected_ids: Vec<String> = selected.iter().map(|q| q.id.clone()).collect();
        self.store.begin(&selected_ids).await?;

        self.activate(selected, 0);

        tracing::info!(
            "Session {} started: user={}, backend={}, questions={}",
            self.id,
            self.user_id,
            self.store.backend().as_str(),
            self.questions.len()
        );
        Ok(())
    }

    /// Rebuilds an in-progress session over a store that already holds its
    /// records. Position moves to the first unanswered question.
    pub fn resume(&mut self, questions: Vec<Question>) -> Result<(), QuizError> {
        if self.status != SessionStatus::NotStarted {
            return Err(QuizError::SessionAlreadyStarted);
        }
        if questions.is_empty() {
            return Err(QuizError::EmptySelection);
        }

        let position = questions
            .iter()
            .position(|q| {
                !self
                    .store
                    .get_attempt(&q.id)
                    .map(|record| record.is_attempted)
                    .unwrap_or(false)
            })
            .unwrap_or(questions.len() - 1);

        self.activate(questions, position);

        let stats = self.stats();
        self.halfway = trophies::check_halfway(HalfwayCheckpoint::Pending, &stats);
        let evaluation = trophies::evaluate(&stats, &self.signals(), &BTreeSet::new());
        self.unlocked = evaluation.unlocked.into_iter().collect();

        tracing::info!(
            "Session {} resumed: user={}, backend={}, answered={}/{}",
            self.id,
            self.user_id,
            self.store.backend().as_str(),
            stats.answered(),
            stats.total
        );
        Ok(())
    }

    fn activate(&mut self, questions: Vec<Question>, position: usize) {
        self.scrambles = questions
            .iter()
            .map(|q| (q.id.clone(), (self.scramble_source)(q.option_count())))
            .collect();
        self.questions = questions;
        self.position = position;
        self.pending.clear();
        self.shown_at.clear();
        self.started_at = self.clock.now();
        self.status = SessionStatus::InProgress;
        self.mark_shown();

        SESSIONS_TOTAL.with_label_values(&["started"]).inc();
        SESSIONS_ACTIVE.inc();
    }

    /// Records the pending choice for the current question. Ignored once it is answered.
    pub fn select_answer(&mut self, display_index: usize) -> Result<(), QuizError> {
        self.require_in_progress()?;
        let question = self.current()?;
        if self.is_answered(&question.id) {
            return Ok(());
        }
        let len = question.option_count();
        if display_index >= len {
            return Err(QuizError::InvalidOption {
                index: display_index,
                len,
            });
        }
        let question_id = question.id.clone();
        self.pending.insert(question_id, display_index);
        Ok(())
    }

    /// Submits the pending choice. The question only flips to answered once
    /// the store has confirmed the write; on failure the choice stays pending
    /// so the caller can retry.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, QuizError> {
        self.require_in_progress()?;
        let question = self.current()?.clone();

        if let Some(record) = self.store.get_attempt(&question.id).filter(|r| r.is_attempted) {
            return Ok(SubmitOutcome {
                question_id: question.id.clone(),
                selected_original_index: record.selected_original_index.unwrap_or_default(),
                is_correct: record.is_correct.unwrap_or(false),
                response_time_ms: record.response_time_ms.unwrap_or_default(),
                already_answered: true,
                newly_unlocked: Vec::new(),
            });
        }

        let display_index = *self
            .pending
            .get(&question.id)
            .ok_or(QuizError::NoAnswerSelected)?;
        let original_index = self.scramble(&question.id)?.require_original(display_index)?;
        let is_correct = question.correct_index() == Some(original_index);

        let now = self.clock.now();
        let shown = self
            .shown_at
            .get(&question.id)
            .copied()
            .unwrap_or(self.started_at);
        let response_time_ms = elapsed_ms(shown, now);

        self.store
            .record_attempt(&question.id, original_index, is_correct, response_time_ms, now)
            .await?;
        self.pending.remove(&question.id);

        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[if is_correct { "true" } else { "false" }])
            .inc();

        let stats = self.stats();
        self.halfway = trophies::check_halfway(self.halfway, &stats);
        let evaluation = trophies::evaluate(&stats, &self.signals(), &self.unlocked);
        for trophy in &evaluation.newly_unlocked {
            TROPHIES_UNLOCKED_TOTAL
                .with_label_values(&[trophy.as_str()])
                .inc();
            tracing::info!(
                "Trophy unlocked: session={}, user={}, trophy={}",
                self.id,
                self.user_id,
                trophy.as_str()
            );
        }
        self.unlocked.extend(evaluation.newly_unlocked.iter().copied());

        tracing::debug!(
            "Answer submitted: session={}, question={}, correct={}, ms={}",
            self.id,
            question.id,
            is_correct,
            response_time_ms
        );

        Ok(SubmitOutcome {
            question_id: question.id,
            selected_original_index: original_index,
            is_correct,
            response_time_ms,
            already_answered: false,
            newly_unlocked: evaluation.newly_unlocked,
        })
    }

    /// Moves forward; on the last question this completes the session instead.
    pub async fn next(&mut self) -> Result<Navigation, QuizError> {
        self.require_in_progress()?;
        if self.position + 1 >= self.questions.len() {
            let summary = self.complete().await?;
            return Ok(Navigation::Completed { summary });
        }
        self.position += 1;
        self.mark_shown();
        Ok(Navigation::Moved {
            position: self.position,
        })
    }

    pub fn previous(&mut self) -> Result<Navigation, QuizError> {
        self.require_in_progress()?;
        self.position = self.position.saturating_sub(1);
        self.mark_shown();
        Ok(Navigation::Moved {
            position: self.position,
        })
    }

    /// Finalizes the session and drops its scramble and pending state.
    /// Recorded attempts stay in the store.
    pub async fn complete(&mut self) -> Result<CompletionSummary, QuizError> {
        self.require_in_progress()?;
        self.store.finish().await?;

        let stats = self.stats();
        self.halfway = trophies::check_halfway(self.halfway, &stats);
        let evaluation = trophies::evaluate(&stats, &self.signals(), &self.unlocked);
        for trophy in &evaluation.newly_unlocked {
            TROPHIES_UNLOCKED_TOTAL
                .with_label_values(&[trophy.as_str()])
                .inc();
        }
        self.unlocked.extend(evaluation.newly_unlocked.iter().copied());

        self.status = SessionStatus::Completed;
        self.scrambles.clear();
        self.pending.clear();
        self.shown_at.clear();

        SESSIONS_TOTAL.with_label_values(&["completed"]).inc();
        SESSIONS_ACTIVE.dec();

        let completed_at = self.clock.now();
        tracing::info!(
            "Session {} completed: user={}, correct={}/{}, accuracy={}%",
            self.id,
            self.user_id,
            stats.correct,
            stats.total,
            stats.accuracy_percent
        );

        Ok(CompletionSummary {
            session_id: self.id.clone(),
            backend: self.store.backend(),
            store_key: self.store.store_key(),
            started_at: self.started_at,
            completed_at,
            stats,
            unlocked: self.unlocked.iter().copied().collect(),
        })
    }

    pub fn stats(&self) -> DerivedStats {
        compute_stats(&self.questions, self.store.attempts())
    }

    pub fn view(&self) -> Result<SessionView, QuizError> {
        let stats = self.stats();
        let question = match self.status {
            SessionStatus::InProgress => Some(self.question_view(self.current()?)?),
            _ => None,
        };
        let trophies = trophies::evaluate(&stats, &self.signals(), &self.unlocked);

        Ok(SessionView {
            session_id: self.id.clone(),
            status: self.status,
            backend: self.store.backend(),
            store_key: self.store.store_key(),
            position: self.position,
            total: self.questions.len(),
            started_at: self.started_at,
            question,
            stats,
            trophies,
        })
    }

    fn question_view(&self, question: &Question) -> Result<QuestionView, QuizError> {
        let map = self.scramble(&question.id)?;
        let options = map
            .order()
            .iter()
            .map(|&original| {
                question
                    .options
                    .get(original)
                    .map(|option| option.text.clone())
                    .ok_or(QuizError::InvalidScrambleState {
                        index: original,
                        len: question.option_count(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let record = self
            .store
            .get_attempt(&question.id)
            .filter(|record| record.is_attempted);

        let view = match record {
            Some(record) => QuestionView {
                id: question.id.clone(),
                body: question.body.clone(),
                options,
                selected_display_index: record
                    .selected_original_index
                    .map(|original| map.require_display(original))
                    .transpose()?,
                answered: true,
                is_correct: record.is_correct,
                correct_display_index: question
                    .correct_index()
                    .map(|original| map.require_display(original))
                    .transpose()?,
                explanation: question.explanation.clone(),
            },
            None => QuestionView {
                id: question.id.clone(),
                body: question.body.clone(),
                options,
                selected_display_index: self.pending.get(&question.id).copied(),
                answered: false,
                is_correct: None,
                correct_display_index: None,
                explanation: None,
            },
        };
        Ok(view)
    }

    fn signals(&self) -> SessionSignals {
        SessionSignals {
            halfway: self.halfway,
        }
    }

    fn require_in_progress(&self) -> Result<(), QuizError> {
        match self.status {
            SessionStatus::InProgress => Ok(()),
            status => Err(QuizError::not_in_progress(status)),
        }
    }

    fn current(&self) -> Result<&Question, QuizError> {
        self.questions
            .get(self.position)
            .ok_or(QuizError::SessionNotStarted)
    }

    fn scramble(&self, question_id: &str) -> Result<&ScrambleMap, QuizError> {
        self.scrambles
            .get(question_id)
            .ok_or(QuizError::InvalidScrambleState { index: 0, len: 0 })
    }

    fn is_answered(&self, question_id: &str) -> bool {
        self.store
            .get_attempt(question_id)
            .map(|record| record.is_attempted)
            .unwrap_or(false)
    }

    fn mark_shown(&mut self) {
        if let Some(question) = self.questions.get(self.position) {
            let now = self.clock.now();
            self.shown_at.entry(question.id.clone()).or_insert(now);
        }
    }
}

impl Drop for QuizSession {
    fn drop(&mut self) {
        if self.status == SessionStatus::InProgress {
            SESSIONS_TOTAL.with_label_values(&["abandoned"]).inc();
            SESSIONS_ACTIVE.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerOption;
    use crate::services::attempt_store::memory::InMemoryAttemptRepository;
    use crate::services::attempt_store::storage::MemoryStorage;
    use crate::services::attempt_store::{LocalAttemptStore, RemoteAttemptStore};
    use crate::utils::retry::RetryConfig;
    use crate::utils::time::ManualClock;

    fn question(id: &str, correct: usize, count: usize) -> Question {
        let options = (0..count)
            .map(|i| AnswerOption::new(format!("{}-opt{}", id, i), i == correct))
            .collect();
        Question::new(id, format!("Body of {}", id), options)
    }

    fn identity_source() -> ScrambleSource {
        Arc::new(ScrambleMap::identity)
    }

    async fn local_session(clock: Arc<ManualClock>) -> QuizSession {
        let storage = Arc::new(MemoryStorage::default());
        let store = LocalAttemptStore::open(storage, "u1", "repo-1").await.unwrap();
        QuizSession::new("user-1", Box::new(store), clock).with_scramble_source(identity_source())
    }

    #[tokio::test]
    async fn four_question_scenario_summary() {
        let clock = Arc::new(ManualClock::default());
        let mut session = local_session(clock.clone()).await;
        let questions = (0..4).map(|i| question(&format!("q{}", i), 0, 3)).collect();
        session
            .start(questions, &[AttemptState::Unanswered])
            .await
            .unwrap();

        let plan = [(0, 100), (1, 200), (0, 150), (0, 100)];
        let mut summary = None;
        for (display, ms) in plan {
            clock.advance_ms(ms);
            session.select_answer(display).unwrap();
            let outcome = session.submit().await.unwrap();
            assert_eq!(outcome.response_time_ms, ms as u64);
            if let Navigation::Completed { summary: s } = session.next().await.unwrap() {
                summary = Some(s);
            }
        }

        let summary = summary.expect("next() on the last question completes");
        assert_eq!(summary.stats.total, 4);
        assert_eq!(summary.stats.correct, 3);
        assert_eq!(summary.stats.incorrect, 1);
        assert_eq!(summary.stats.unanswered, 0);
        assert_eq!(summary.stats.accuracy_percent, 75);
        assert_eq!(summary.stats.average_response_time_ms, 138);
        assert!(summary.unlocked.contains(&TrophyType::FinishLine));
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(summary.store_key, "repo-1");
    }

    #[tokio::test]
    async fn scrambled_display_index_maps_to_original() {
        let clock = Arc::new(ManualClock::default());
        let storage = Arc::new(MemoryStorage::default());
        let store = LocalAttemptStore::open(storage, "u1", "r").await.unwrap();
        let mut session = QuizSession::new("u", Box::new(store), clock).with_scramble_source(
            Arc::new(|n: usize| ScrambleMap::from_order(vec![2, 0, 3, 1][..n].to_vec()).unwrap()),
        );
        session.start(vec![question("q", 2, 4)], &[]).await.unwrap();

        let view = session.view().unwrap().question.unwrap();
        assert_eq!(view.options[0], "q-opt2");

        session.select_answer(0).unwrap();
        let outcome = session.submit().await.unwrap();
        assert_eq!(outcome.selected_original_index, 2);
        assert!(outcome.is_correct);

        let view = session.view().unwrap().question.unwrap();
        assert_eq!(view.selected_display_index, Some(0));
        assert_eq!(view.correct_display_index, Some(0));
    }

    #[tokio::test]
    async fn revisiting_restores_answered_state() {
        let clock = Arc::new(ManualClock::default());
        let mut session = local_session(clock).await;
        session
            .start(vec![question("q1", 1, 3), question("q2", 0, 3)], &[])
            .await
            .unwrap();

        session.select_answer(2).unwrap();
        session.submit().await.unwrap();
        session.next().await.unwrap();
        session.select_answer(0).unwrap();
        session.submit().await.unwrap();
        session.previous().unwrap();

        let view = session.view().unwrap().question.unwrap();
        assert_eq!(view.id, "q1");
        assert!(view.answered);
        assert_eq!(view.selected_display_index, Some(2));
        assert_eq!(view.is_correct, Some(false));
        assert_eq!(view.correct_display_index, Some(1));

        // Answered questions ignore new selections and resubmits.
        session.select_answer(1).unwrap();
        let again = session.submit().await.unwrap();
        assert!(again.already_answered);
        assert!(!again.is_correct);
    }

    #[tokio::test]
    async fn failed_remote_write_keeps_question_unanswered() {
        let repo = Arc::new(InMemoryAttemptRepository::default());
        let store = RemoteAttemptStore::new(repo.clone(), "user-1", "repo-1")
            .with_retry(RetryConfig::no_wait(1));
        let clock = Arc::new(ManualClock::default());
        let mut session = QuizSession::new("user-1", Box::new(store), clock)
            .with_scramble_source(identity_source());
        session.start(vec![question("q1", 0, 2)], &[]).await.unwrap();

        repo.fail_writes(true);
        session.select_answer(0).unwrap();
        let err = session.submit().await.unwrap_err();
        assert!(matches!(err, QuizError::RemoteWriteFailure { .. }));

        let view = session.view().unwrap().question.unwrap();
        assert!(!view.answered);
        assert_eq!(view.selected_display_index, Some(0));
        assert_eq!(session.stats().unanswered, 1);

        repo.fail_writes(false);
        let outcome = session.submit().await.unwrap();
        assert!(outcome.is_correct);
        assert!(session.view().unwrap().question.unwrap().answered);
    }

    #[tokio::test]
    async fn empty_filter_result_does_not_start() {
        let clock = Arc::new(ManualClock::default());
        let mut session = local_session(clock).await;
        let err = session
            .start(vec![question("q1", 0, 2)], &[AttemptState::Incorrect])
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::EmptySelection));
        assert_eq!(session.status(), SessionStatus::NotStarted);
        assert!(matches!(
            session.select_answer(0),
            Err(QuizError::SessionNotStarted)
        ));
    }

    #[tokio::test]
    async fn filter_uses_previous_outcomes() {
        let clock = Arc::new(ManualClock::default());
        let storage = Arc::new(MemoryStorage::default());

        let store = LocalAttemptStore::open(storage.clone(), "u1", "repo").await.unwrap();
        let mut first = QuizSession::new("u", Box::new(store), clock.clone())
            .with_scramble_source(identity_source());
        first
            .start(vec![question("a", 0, 2), question("b", 0, 2)], &[])
            .await
            .unwrap();
        first.select_answer(1).unwrap();
        first.submit().await.unwrap();
        first.complete().await.unwrap();

        let store = LocalAttemptStore::open(storage, "u1", "repo").await.unwrap();
        let mut second = QuizSession::new("u", Box::new(store), clock)
            .with_scramble_source(identity_source());
        second
            .start(
                vec![question("a", 0, 2), question("b", 0, 2)],
                &[AttemptState::Incorrect],
            )
            .await
            .unwrap();

        let view = second.view().unwrap();
        assert_eq!(view.total, 1);
        assert_eq!(view.question.unwrap().id, "a");
    }

    #[tokio::test]
    async fn submit_without_selection_fails() {
        let clock = Arc::new(ManualClock::default());
        let mut session = local_session(clock).await;
        session.start(vec![question("q1", 0, 2)], &[]).await.unwrap();
        assert!(matches!(
            session.submit().await,
            Err(QuizError::NoAnswerSelected)
        ));
        assert!(matches!(
            session.select_answer(5),
            Err(QuizError::InvalidOption { index: 5, len: 2 })
        ));
    }

    #[tokio::test]
    async fn completed_session_rejects_actions() {
        let clock = Arc::new(ManualClock::default());
        let mut session = local_session(clock).await;
        session.start(vec![question("q1", 0, 2)], &[]).await.unwrap();
        session.complete().await.unwrap();

        assert!(matches!(
            session.next().await,
            Err(QuizError::SessionCompleted)
        ));
        assert!(session.view().unwrap().question.is_none());
    }

    #[tokio::test]
    async fn resume_lands_on_first_unanswered() {
        let repo = Arc::new(InMemoryAttemptRepository::default());
        let qs = vec![question("q1", 0, 2), question("q2", 0, 2), question("q3", 0, 2)];
        repo.insert_questions(qs.clone());

        let clock = Arc::new(ManualClock::default());
        let store = RemoteAttemptStore::new(repo.clone(), "user-1", "repo-1");
        let mut session = QuizSession::new("user-1", Box::new(store), clock.clone())
            .with_scramble_source(identity_source());
        session.start(qs, &[]).await.unwrap();
        session.select_answer(0).unwrap();
        session.submit().await.unwrap();
        let attempt_id = session.store_key();
        drop(session);

        let (store, questions) = RemoteAttemptStore::resume(repo, "user-1", &attempt_id)
            .await
            .unwrap();
        let mut resumed = QuizSession::new("user-1", Box::new(store), clock)
            .with_scramble_source(identity_source());
        resumed.resume(questions).unwrap();

        assert_eq!(resumed.position(), 1);
        assert_eq!(resumed.stats().correct, 1);
        resumed.previous().unwrap();
        let view = resumed.view().unwrap().question.unwrap();
        assert!(view.answered);
        assert_eq!(view.selected_display_index, Some(0));
    }
}
