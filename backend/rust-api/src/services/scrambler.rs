//! Per-session answer-option permutations.
//!
//! `order[display_index] = original_index`. A map is generated once when a
//! session starts and never regenerated, so a revisited question shows its
//! options in the order the user answered them.

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::error::QuizError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrambleMap {
    order: Vec<usize>,
}

impl ScrambleMap {
    pub fn identity(option_count: usize) -> Self {
        Self {
            order: (0..option_count).collect(),
        }
    }

    /// Builds a map from an explicit order, rejecting anything that is not a bijection.
    pub fn from_order(order: Vec<usize>) -> Result<Self, QuizError> {
        let len = order.len();
        let mut seen = vec![false; len];
        for &original in &order {
            match seen.get_mut(original) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(QuizError::InvalidScrambleState { index: original, len }),
            }
        }
        Ok(Self { order })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Inverse lookup; `None` when the original index is not in the permutation.
    pub fn to_display(&self, original_index: usize) -> Option<usize> {
        self.order.iter().position(|&o| o == original_index)
    }

    pub fn to_original(&self, display_index: usize) -> Option<usize> {
        self.order.get(display_index).copied()
    }

    pub fn require_display(&self, original_index: usize) -> Result<usize, QuizError> {
        self.to_display(original_index)
            .ok_or(QuizError::InvalidScrambleState {
                index: original_index,
                len: self.len(),
            })
    }

    pub fn require_original(&self, display_index: usize) -> Result<usize, QuizError> {
        self.to_original(display_index)
            .ok_or(QuizError::InvalidScrambleState {
                index: display_index,
                len: self.len(),
            })
    }
}

pub fn generate(option_count: usize) -> ScrambleMap {
    generate_with(option_count, &mut rand::rng())
}

/// Uniform shuffle of `[0, option_count)`.
pub fn generate_with<R: Rng + ?Sized>(option_count: usize, rng: &mut R) -> ScrambleMap {
    let mut order: Vec<usize> = (0..option_count).collect();
    order.shuffle(rng);
    ScrambleMap { order }
}
