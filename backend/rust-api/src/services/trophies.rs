//! Fixed trophy catalog and evaluation.

use std::collections::BTreeSet;

use crate::models::session::DerivedStats;
use crate::models::trophy::{
    HalfwayCheckpoint, SessionSignals, TrophyCandidate, TrophyEvaluation, TrophyProgress,
    TrophyType,
};

use super::stats::rounded_percent;

pub const HAT_TRICK_STREAK: u32 = 3;
pub const ON_FIRE_STREAK: u32 = 5;
pub const UNSTOPPABLE_STREAK: u32 = 10;
pub const SHARPSHOOTER_ACCURACY: u32 = 90;
pub const MIN_ANSWERED_FOR_RATES: u32 = 5;
pub const QUICK_THINKER_AVG_MS: u64 = 3000;
pub const LIGHTNING_AVG_MS: u64 = 1500;
pub const COMEBACK_STREAK: u32 = 3;
pub const HALFWAY_ACCURACY: u32 = 80;

pub struct TrophyDefinition {
    pub trophy: TrophyType,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    progress: fn(&DerivedStats, &SessionSignals) -> TrophyProgress,
}

impl TrophyDefinition {
    pub fn progress(&self, stats: &DerivedStats, signals: &SessionSignals) -> TrophyProgress {
        (self.progress)(stats, signals)
    }
}

pub static CATALOG: [TrophyDefinition; 10] = [
    TrophyDefinition {
        trophy: TrophyType::HatTrick,
        name: "Hat Trick",
        description: "Answer 3 questions in a row correctly",
        icon: "flame",
        progress: |stats, _| streak_progress(stats, HAT_TRICK_STREAK),
    },
    TrophyDefinition {
        trophy: TrophyType::OnFire,
        name: "On Fire",
        description: "Answer 5 questions in a row correctly",
        icon: "fire",
        progress: |stats, _| streak_progress(stats, ON_FIRE_STREAK),
    },
    TrophyDefinition {
        trophy: TrophyType::Unstoppable,
        name: "Unstoppable",
        description: "Answer 10 questions in a row correctly",
        icon: "rocket",
        progress: |stats, _| streak_progress(stats, UNSTOPPABLE_STREAK),
    },
    TrophyDefinition {
        trophy: TrophyType::Sharpshooter,
        name: "Sharpshooter",
        description: "Keep 90% accuracy over at least 5 answers",
        icon: "target",
        progress: sharpshooter_progress,
    },
    TrophyDefinition {
        trophy: TrophyType::Perfectionist,
        name: "Perfectionist",
        description: "Finish the quiz without a single miss",
        icon: "crown",
        progress: perfectionist_progress,
    },
    TrophyDefinition {
        trophy: TrophyType::QuickThinker,
        name: "Quick Thinker",
        description: "Average under 3 seconds per answer over at least 5 answers",
        icon: "clock",
        progress: |stats, _| speed_progress(stats, QUICK_THINKER_AVG_MS),
    },
    TrophyDefinition {
        trophy: TrophyType::Lightning,
        name: "Lightning",
        description: "Average under 1.5 seconds per answer over at least 5 answers",
        icon: "bolt",
        progress: |stats, _| speed_progress(stats, LIGHTNING_AVG_MS),
    },
    TrophyDefinition {
        trophy: TrophyType::ComebackKid,
        name: "Comeback Kid",
        description: "Get 3 in a row right after a miss",
        icon: "trending-up",
        progress: comeback_progress,
    },
    TrophyDefinition {
        trophy: TrophyType::HalfwayHero,
        name: "Halfway Hero",
        description: "Reach the halfway point with at least 80% accuracy",
        icon: "flag",
        progress: halfway_progress,
    },
    TrophyDefinition {
        trophy: TrophyType::FinishLine,
        name: "Finish Line",
        description: "Answer every question in the quiz",
        icon: "check-circle",
        progress: finish_line_progress,
    },
];

pub fn definition(trophy: TrophyType) -> &'static TrophyDefinition {
    CATALOG
        .iter()
        .find(|def| def.trophy == trophy)
        .unwrap_or(&CATALOG[0])
}

/// Evaluates every trophy not yet in `unlocked` against the current stats.
pub fn evaluate(
    stats: &DerivedStats,
    signals: &SessionSignals,
    unlocked: &BTreeSet<TrophyType>,
) -> TrophyEvaluation {
    let mut newly_unlocked = Vec::new();
    let mut candidates = Vec::new();

    for def in CATALOG.iter().filter(|def| !unlocked.contains(&def.trophy)) {
        let progress = def.progress(stats, signals);
        if progress.progress_percent >= 100 {
            newly_unlocked.push(def.trophy);
        } else if progress.achievable {
            candidates.push(TrophyCandidate {
                trophy: def.trophy,
                name: def.name,
                icon: def.icon,
                progress_percent: progress.progress_percent,
                label: progress.label,
            });
        }
    }

    // Stable sort keeps catalog order for ties.
    candidates.sort_by(|a, b| b.progress_percent.cmp(&a.progress_percent));

    let all_unlocked = CATALOG
        .iter()
        .map(|def| def.trophy)
        .filter(|trophy| unlocked.contains(trophy) || newly_unlocked.contains(trophy))
        .collect();

    TrophyEvaluation {
        unlocked: all_unlocked,
        newly_unlocked,
        next_challenge: candidates.first().cloned(),
        candidates,
    }
}

pub fn halfway_target(total_questions: u32) -> u32 {
    total_questions / 2
}

/// Advances the halfway checkpoint. It is decided once: at the exact
/// answered count, or as missed when that count was skipped over.
pub fn check_halfway(current: HalfwayCheckpoint, stats: &DerivedStats) -> HalfwayCheckpoint {
    if current != HalfwayCheckpoint::Pending {
        return current;
    }
    let target = halfway_target(stats.total);
    let answered = stats.answered();
    if target == 0 || answered > target {
        HalfwayCheckpoint::Missed
    } else if answered == target {
        if stats.accuracy_percent >= HALFWAY_ACCURACY {
            HalfwayCheckpoint::Passed
        } else {
            HalfwayCheckpoint::Missed
        }
    } else {
        HalfwayCheckpoint::Pending
    }
}

fn complete(label: impl Into<String>) -> TrophyProgress {
    TrophyProgress {
        progress_percent: 100,
        label: label.into(),
        achievable: false,
    }
}

fn in_progress(progress_percent: u32, label: impl Into<String>) -> TrophyProgress {
    TrophyProgress {
        progress_percent: progress_percent.min(99),
        label: label.into(),
        achievable: true,
    }
}

fn out_of_reach(label: impl Into<String>) -> TrophyProgress {
    TrophyProgress {
        progress_percent: 0,
        label: label.into(),
        achievable: false,
    }
}

fn floor_percent(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part * 100 / whole).min(100) as u32
}

fn streak_progress(stats: &DerivedStats, target: u32) -> TrophyProgress {
    if stats.current_streak.max(stats.longest_streak) >= target {
        return complete(format!("{} in a row", target));
    }
    in_progress(
        floor_percent(stats.current_streak as u64, target as u64),
        format!("{}/{} in a row", stats.current_streak, target),
    )
}

fn sharpshooter_progress(stats: &DerivedStats, _: &SessionSignals) -> TrophyProgress {
    let answered = stats.answered();
    if answered >= MIN_ANSWERED_FOR_RATES && stats.accuracy_percent >= SHARPSHOOTER_ACCURACY {
        return complete(format!("{}% accuracy", stats.accuracy_percent));
    }
    if answered < MIN_ANSWERED_FOR_RATES {
        let remaining_possible = stats.unanswered + answered >= MIN_ANSWERED_FOR_RATES;
        if !remaining_possible {
            return out_of_reach("Not enough questions left");
        }
        return in_progress(
            floor_percent(answered as u64, MIN_ANSWERED_FOR_RATES as u64),
            format!("{}/{} answered", answered, MIN_ANSWERED_FOR_RATES),
        );
    }
    in_progress(
        floor_percent(stats.accuracy_percent as u64, SHARPSHOOTER_ACCURACY as u64),
        format!(
            "{}% accuracy, need {}%",
            stats.accuracy_percent, SHARPSHOOTER_ACCURACY
        ),
    )
}

fn perfectionist_progress(stats: &DerivedStats, _: &SessionSignals) -> TrophyProgress {
    if stats.total == 0 {
        return out_of_reach("No questions");
    }
    if stats.incorrect > 0 {
        return out_of_reach("A miss ends the perfect run");
    }
    if stats.unanswered == 0 {
        return complete("100% accuracy");
    }
    in_progress(
        stats.progress_percent,
        format!("{}/{} without a miss", stats.answered(), stats.total),
    )
}

fn speed_progress(stats: &DerivedStats, threshold_ms: u64) -> TrophyProgress {
    let answered = stats.answered();
    let fast_enough = stats.mean_response_time_below(threshold_ms);
    if answered >= MIN_ANSWERED_FOR_RATES && fast_enough {
        return complete(format!("{} ms average", stats.average_response_time_ms));
    }
    if answered < MIN_ANSWERED_FOR_RATES {
        if stats.unanswered + answered < MIN_ANSWERED_FOR_RATES {
            return out_of_reach("Not enough questions left");
        }
        return in_progress(
            floor_percent(answered as u64, MIN_ANSWERED_FOR_RATES as u64),
            format!("{}/{} answered", answered, MIN_ANSWERED_FOR_RATES),
        );
    }
    in_progress(
        floor_percent(threshold_ms, stats.average_response_time_ms),
        format!(
            "{} ms average, need under {} ms",
            stats.average_response_time_ms, threshold_ms
        ),
    )
}

fn comeback_progress(stats: &DerivedStats, _: &SessionSignals) -> TrophyProgress {
    if stats.had_comeback {
        return complete("Back on track");
    }
    if stats.incorrect == 0 {
        return in_progress(0, "Recover from a miss");
    }
    in_progress(
        floor_percent(stats.current_streak as u64, COMEBACK_STREAK as u64),
        format!(
            "{}/{} since the last miss",
            stats.current_streak, COMEBACK_STREAK
        ),
    )
}

fn halfway_progress(stats: &DerivedStats, signals: &SessionSignals) -> TrophyProgress {
    match signals.halfway {
        HalfwayCheckpoint::Passed => complete("Strong first half"),
        HalfwayCheckpoint::Missed => out_of_reach("Halfway checkpoint passed"),
        HalfwayCheckpoint::Pending => {
            let target = halfway_target(stats.total);
            if target == 0 {
                return out_of_reach("Quiz too short");
            }
            in_progress(
                floor_percent(stats.answered() as u64, target as u64),
                format!(
                    "{}/{} answered, {}% accuracy",
                    stats.answered(),
                    target,
                    stats.accuracy_percent
                ),
            )
        }
    }
}

fn finish_line_progress(stats: &DerivedStats, _: &SessionSignals) -> TrophyProgress {
    if stats.total == 0 {
        return out_of_reach("No questions");
    }
    if stats.unanswered == 0 {
        return complete("All questions answered");
    }
    in_progress(
        rounded_percent(stats.answered(), stats.total),
        format!("{}/{} answered", stats.answered(), stats.total),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(mut s: DerivedStats, average_ms: u64) -> DerivedStats {
        s.timed_answers = s.answered();
        s.total_response_time_ms = average_ms * s.timed_answers as u64;
        s.average_response_time_ms = average_ms;
        s
    }

    fn stats(total: u32, correct: u32, incorrect: u32) -> DerivedStats {
        DerivedStats {
            total,
            correct,
            incorrect,
            unanswered: total - correct - incorrect,
            accuracy_percent: rounded_percent(correct, correct + incorrect),
            progress_percent: rounded_percent(correct + incorrect, total),
            ..DerivedStats::default()
        }
    }

    #[test]
    fn catalog_has_ten_distinct_trophies() {
        let distinct: BTreeSet<_> = CATALOG.iter().map(|def| def.trophy).collect();
        assert_eq!(distinct.len(), 10);
        assert_eq!(definition(TrophyType::Lightning).name, "Lightning");
    }

    #[test]
    fn hat_trick_unlocks_at_three_in_a_row() {
        let mut s = stats(10, 3, 0);
        s.current_streak = 3;

        let eval = evaluate(&s, &SessionSignals::default(), &BTreeSet::new());
        assert!(eval.unlocked.contains(&TrophyType::HatTrick));
        assert!(eval.newly_unlocked.contains(&TrophyType::HatTrick));
        assert!(eval
            .candidates
            .iter()
            .all(|c| c.trophy != TrophyType::HatTrick));
    }

    #[test]
    fn unlocked_trophies_never_return_as_candidates() {
        let s = stats(10, 0, 1);
        let prior: BTreeSet<_> = [TrophyType::HatTrick].into_iter().collect();

        let eval = evaluate(&s, &SessionSignals::default(), &prior);
        assert_eq!(eval.unlocked, vec![TrophyType::HatTrick]);
        assert!(eval.newly_unlocked.is_empty());
        assert!(eval
            .candidates
            .iter()
            .all(|c| c.trophy != TrophyType::HatTrick));
    }

    #[test]
    fn candidates_sorted_by_progress_then_catalog_order() {
        let mut s = timed(stats(10, 2, 0), 1000);
        s.current_streak = 2;
        s.longest_streak = 2;

        let eval = evaluate(&s, &SessionSignals::default(), &BTreeSet::new());
        let progress: Vec<u32> = eval.candidates.iter().map(|c| c.progress_percent).collect();
        let mut sorted = progress.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(progress, sorted);

        // HAT_TRICK at 66% leads; the 40% group keeps catalog order.
        let next = eval.next_challenge.unwrap();
        assert_eq!(next.trophy, TrophyType::HatTrick);
        assert_eq!(next.progress_percent, 66);
    }

    #[test]
    fn sharpshooter_needs_five_answers() {
        let s = stats(10, 4, 0);
        let p = definition(TrophyType::Sharpshooter).progress(&s, &SessionSignals::default());
        assert_eq!(p.progress_percent, 80);
        assert!(p.achievable);

        let s = stats(10, 9, 1);
        let p = definition(TrophyType::Sharpshooter).progress(&s, &SessionSignals::default());
        assert_eq!(p.progress_percent, 100);
        assert!(!p.achievable);
    }

    #[test]
    fn perfectionist_requires_completion_without_misses() {
        let def = definition(TrophyType::Perfectionist);
        let signals = SessionSignals::default();

        assert_eq!(def.progress(&stats(4, 4, 0), &signals).progress_percent, 100);
        assert!(!def.progress(&stats(4, 2, 1), &signals).achievable);
        assert_eq!(def.progress(&stats(4, 2, 0), &signals).progress_percent, 50);
    }

    #[test]
    fn speed_trophies_use_strict_thresholds() {
        let s = timed(stats(10, 5, 0), 1500);
        let signals = SessionSignals::default();

        assert_eq!(
            definition(TrophyType::QuickThinker)
                .progress(&s, &signals)
                .progress_percent,
            100
        );
        let lightning = definition(TrophyType::Lightning).progress(&s, &signals);
        assert!(lightning.progress_percent < 100);
        assert!(lightning.achievable);

        let s = timed(stats(10, 5, 0), 1499);
        assert_eq!(
            definition(TrophyType::Lightning)
                .progress(&s, &signals)
                .progress_percent,
            100
        );
    }

    #[test]
    fn speed_trophies_compare_unrounded_mean() {
        // 14998 ms over 5 answers is 2999.6 ms, shown as 3000.
        let mut s = stats(10, 5, 0);
        s.timed_answers = 5;
        s.total_response_time_ms = 14_998;
        s.average_response_time_ms = 3000;
        let signals = SessionSignals::default();

        let quick = definition(TrophyType::QuickThinker).progress(&s, &signals);
        assert_eq!(quick.progress_percent, 100);

        // 7501 ms over 5 answers is 1500.2 ms, shown as 1500.
        s.total_response_time_ms = 7_501;
        s.average_response_time_ms = 1500;
        let lightning = definition(TrophyType::Lightning).progress(&s, &signals);
        assert!(lightning.progress_percent < 100);
    }

    #[test]
    fn rate_trophies_out_of_reach_on_short_quizzes() {
        let s = stats(3, 1, 0);
        let signals = SessionSignals::default();
        assert!(!definition(TrophyType::QuickThinker).progress(&s, &signals).achievable);
        assert!(!definition(TrophyType::Sharpshooter).progress(&s, &signals).achievable);
    }

    #[test]
    fn comeback_unlocks_from_stats_flag() {
        let mut s = stats(10, 3, 1);
        s.current_streak = 3;
        s.had_comeback = true;

        let eval = evaluate(&s, &SessionSignals::default(), &BTreeSet::new());
        assert!(eval.newly_unlocked.contains(&TrophyType::ComebackKid));
    }

    #[test]
    fn halfway_checkpoint_exact_match() {
        // total 6 -> checkpoint at 3 answered
        let s = stats(6, 3, 0);
        assert_eq!(
            check_halfway(HalfwayCheckpoint::Pending, &s),
            HalfwayCheckpoint::Passed
        );

        let s = stats(6, 2, 1);
        assert_eq!(
            check_halfway(HalfwayCheckpoint::Pending, &s),
            HalfwayCheckpoint::Missed
        );

        let s = stats(6, 2, 0);
        assert_eq!(
            check_halfway(HalfwayCheckpoint::Pending, &s),
            HalfwayCheckpoint::Pending
        );
    }

    #[test]
    fn halfway_overshoot_is_missed_for_good() {
        // total 7 -> checkpoint at 3; first evaluation happens at 4 answered.
        let s = stats(7, 4, 0);
        let state = check_halfway(HalfwayCheckpoint::Pending, &s);
        assert_eq!(state, HalfwayCheckpoint::Missed);

        let signals = SessionSignals { halfway: state };
        let p = definition(TrophyType::HalfwayHero).progress(&s, &signals);
        assert!(!p.achievable);
        assert_eq!(check_halfway(state, &stats(7, 7, 0)), HalfwayCheckpoint::Missed);
    }

    #[test]
    fn single_question_quiz_has_no_halfway() {
        let s = stats(1, 0, 0);
        assert_eq!(
            check_halfway(HalfwayCheckpoint::Pending, &s),
            HalfwayCheckpoint::Missed
        );
    }

    #[test]
    fn finish_line_tracks_progress() {
        let def = definition(TrophyType::FinishLine);
        let signals = SessionSignals::default();
        assert_eq!(def.progress(&stats(4, 1, 1), &signals).progress_percent, 50);
        assert_eq!(def.progress(&stats(4, 1, 3), &signals).progress_percent, 100);
    }
}
