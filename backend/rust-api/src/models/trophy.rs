use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrophyType {
    HatTrick,
    OnFire,
    Unstoppable,
    Sharpshooter,
    Perfectionist,
    QuickThinker,
    Lightning,
    ComebackKid,
    HalfwayHero,
    FinishLine,
}

impl TrophyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrophyType::HatTrick => "HAT_TRICK",
            TrophyType::OnFire => "ON_FIRE",
            TrophyType::Unstoppable => "UNSTOPPABLE",
            TrophyType::Sharpshooter => "SHARPSHOOTER",
            TrophyType::Perfectionist => "PERFECTIONIST",
            TrophyType::QuickThinker => "QUICK_THINKER",
            TrophyType::Lightning => "LIGHTNING",
            TrophyType::ComebackKid => "COMEBACK_KID",
            TrophyType::HalfwayHero => "HALFWAY_HERO",
            TrophyType::FinishLine => "FINISH_LINE",
        }
    }
}

/// Output of a trophy's progress function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrophyProgress {
    pub progress_percent: u32,
    pub label: String,
    /// False once earned or once it can no longer be earned this session.
    pub achievable: bool,
}

/// Halfway-accuracy checkpoint, evaluated only at `answered == floor(total / 2)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalfwayCheckpoint {
    #[default]
    Pending,
    Passed,
    Missed,
}

/// Session-only signals that are not derivable from `DerivedStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionSignals {
    pub halfway: HalfwayCheckpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrophyCandidate {
    pub trophy: TrophyType,
    pub name: &'static str,
    pub icon: &'static str,
    pub progress_percent: u32,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrophyEvaluation {
    /// Every trophy earned so far, in catalog order.
    pub unlocked: Vec<TrophyType>,
    /// Trophies that crossed 100% during this evaluation.
    pub newly_unlocked: Vec<TrophyType>,
    /// In-progress trophies, highest progress first, ties in catalog order.
    pub candidates: Vec<TrophyCandidate>,
    pub next_challenge: Option<TrophyCandidate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trophy_wire_name_matches_as_str() {
        let json = serde_json::to_string(&TrophyType::HatTrick).unwrap();
        assert_eq!(json, format!("\"{}\"", TrophyType::HatTrick.as_str()));

        let parsed: TrophyType = serde_json::from_str("\"COMEBACK_KID\"").unwrap();
        assert_eq!(parsed, TrophyType::ComebackKid);
    }
}
