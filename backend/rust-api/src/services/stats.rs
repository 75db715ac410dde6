use std::collections::HashMap;

use crate::models::{AttemptRecord, DerivedStats, Question};

/// Projects a session's attempt map onto `DerivedStats`.
///
/// Only questions in `questions` count. Streaks follow submission order
/// (`answered_seq`, then `answered_at`), falling back to question order for
/// records that carry neither.
pub fn compute_stats(
    questions: &[Question],
    attempts: &HashMap<String, AttemptRecord>,
) -> DerivedStats {
    let mut answered: Vec<(usize, &AttemptRecord)> = questions
        .iter()
        .enumerate()
        .filter_map(|(position, question)| {
            attempts
                .get(&question.id)
                .filter(|record| record.is_attempted)
                .map(|record| (position, record))
        })
        .collect();

    answered.sort_by_key(|(position, record)| {
        (
            record.answered_seq.unwrap_or(u64::MAX),
            record.answered_at,
            *position,
        )
    });

    let total = questions.len() as u32;
    let correct = answered
        .iter()
        .filter(|(_, record)| record.is_correct == Some(true))
        .count() as u32;
    let incorrect = answered.len() as u32 - correct;
    let unanswered = total - correct - incorrect;

    let mut current_streak = 0u32;
    let mut longest_streak = 0u32;
    let mut seen_incorrect = false;
    let mut had_comeback = false;
    for (_, record) in &answered {
        if record.is_correct == Some(true) {
            current_streak += 1;
            longest_streak = longest_streak.max(current_streak);
            if seen_incorrect && current_streak >= crate::services::trophies::COMEBACK_STREAK {
                had_comeback = true;
            }
        } else {
            seen_incorrect = true;
            current_streak = 0;
        }
    }

    let timings: Vec<u64> = answered
        .iter()
        .filter_map(|(_, record)| record.response_time_ms)
        .collect();
    let total_response_time_ms: u64 = timings.iter().sum();
    let average_response_time_ms = if timings.is_empty() {
        0
    } else {
        (total_response_time_ms as f64 / timings.len() as f64).round() as u64
    };

    DerivedStats {
        total,
        correct,
        incorrect,
        unanswered,
        accuracy_percent: rounded_percent(correct, correct + incorrect),
        progress_percent: rounded_percent(correct + incorrect, total),
        current_streak,
        longest_streak,
        average_response_time_ms,
        had_comeback,
        total_response_time_ms,
        timed_answers: timings.len() as u32,
    }
}

/// `round(part / whole * 100)`, 0 when `whole` is 0.
pub fn rounded_percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerOption;
    use chrono::Utc;

    fn questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| {
                Question::new(
                    format!("q{}", i),
                    format!("Question {}", i),
                    vec![AnswerOption::new("a", true), AnswerOption::new("b", false)],
                )
            })
            .collect()
    }

    fn answered(seq: u64, correct: bool, ms: u64) -> AttemptRecord {
        AttemptRecord::answered(if correct { 0 } else { 1 }, correct, ms, seq, Utc::now())
    }

    #[test]
    fn empty_scope_is_all_zero() {
        let stats = compute_stats(&[], &HashMap::new());
        assert_eq!(stats, DerivedStats::default());
    }

    #[test]
    fn counts_partition_total() {
        let qs = questions(5);
        let mut attempts = HashMap::new();
        attempts.insert("q0".to_string(), answered(1, true, 100));
        attempts.insert("q1".to_string(), answered(2, false, 200));
        attempts.insert("q2".to_string(), AttemptRecord::unattempted());
        // Outside the session scope; must not count.
        attempts.insert("other".to_string(), answered(3, true, 100));

        let stats = compute_stats(&qs, &attempts);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.incorrect, 1);
        assert_eq!(stats.unanswered, 3);
        assert_eq!(stats.correct + stats.incorrect + stats.unanswered, stats.total);
        assert_eq!(stats.accuracy_percent, 50);
        assert_eq!(stats.progress_percent, 40);
        assert_eq!(stats.average_response_time_ms, 150);
    }

    #[test]
    fn streak_resets_on_incorrect() {
        let qs = questions(4);
        let mut attempts = HashMap::new();
        attempts.insert("q0".to_string(), answered(1, true, 100));
        attempts.insert("q1".to_string(), answered(2, true, 100));
        attempts.insert("q2".to_string(), answered(3, false, 100));
        attempts.insert("q3".to_string(), answered(4, true, 100));

        let stats = compute_stats(&qs, &attempts);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 2);
        assert!(!stats.had_comeback);
    }

    #[test]
    fn streak_follows_submission_order_not_question_order() {
        let qs = questions(3);
        let mut attempts = HashMap::new();
        // q2 answered first (wrong), then q0 and q1 correctly.
        attempts.insert("q2".to_string(), answered(1, false, 100));
        attempts.insert("q0".to_string(), answered(2, true, 100));
        attempts.insert("q1".to_string(), answered(3, true, 100));

        let stats = compute_stats(&qs, &attempts);
        assert_eq!(stats.current_streak, 2);
    }

    #[test]
    fn comeback_needs_three_correct_after_a_miss() {
        let qs = questions(5);
        let mut attempts = HashMap::new();
        attempts.insert("q0".to_string(), answered(1, false, 100));
        attempts.insert("q1".to_string(), answered(2, true, 100));
        attempts.insert("q2".to_string(), answered(3, true, 100));
        assert!(!compute_stats(&qs, &attempts).had_comeback);

        attempts.insert("q3".to_string(), answered(4, true, 100));
        let stats = compute_stats(&qs, &attempts);
        assert!(stats.had_comeback);
        assert_eq!(stats.current_streak, 3);
    }

    #[test]
    fn leading_correct_run_is_not_a_comeback() {
        let qs = questions(3);
        let mut attempts = HashMap::new();
        for (i, id) in ["q0", "q1", "q2"].iter().enumerate() {
            attempts.insert(id.to_string(), answered(i as u64 + 1, true, 100));
        }
        assert!(!compute_stats(&qs, &attempts).had_comeback);
    }

    #[test]
    fn average_keeps_exact_total_for_thresholds() {
        let qs = questions(3);
        let mut attempts = HashMap::new();
        attempts.insert("q0".to_string(), answered(1, true, 2999));
        attempts.insert("q1".to_string(), answered(2, true, 3000));
        attempts.insert("q2".to_string(), answered(3, true, 3000));

        let stats = compute_stats(&qs, &attempts);
        assert_eq!(stats.average_response_time_ms, 3000);
        assert_eq!(stats.total_response_time_ms, 8999);
        assert_eq!(stats.timed_answers, 3);
        assert!(stats.mean_response_time_below(3000));
        assert!(!stats.mean_response_time_below(2999));
    }

    #[test]
    fn percentages_round_half_up() {
        assert_eq!(rounded_percent(2, 3), 67);
        assert_eq!(rounded_percent(1, 8), 13);
        assert_eq!(rounded_percent(0, 0), 0);
        assert_eq!(rounded_percent(3, 3), 100);
    }

    #[test]
    fn compute_is_idempotent() {
        let qs = questions(3);
        let mut attempts = HashMap::new();
        attempts.insert("q1".to_string(), answered(1, true, 321));
        assert_eq!(compute_stats(&qs, &attempts), compute_stats(&qs, &attempts));
    }
}
