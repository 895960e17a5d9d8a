//! Per-lesson progression: the challenge cursor and the grading status of
//! the current attempt.
//!
//! ```text
//! Unanswered --check(Correct)--> Correct --proceed()--> Unanswered (next challenge)
//! Unanswered --check(Wrong)----> Wrong   --proceed()--> Unanswered (same challenge)
//! ```

use serde::{Deserialize, Serialize};

use crate::model::OptionId;

/// Wrong attempts on one challenge after which the answer is revealed.
pub const REVEAL_THRESHOLD: u32 = 3;

/// Result of grading one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Wrong,
}

/// Grading state of the active challenge attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    #[default]
    Unanswered,
    Correct,
    Wrong,
}

impl From<Verdict> for AttemptStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Correct => AttemptStatus::Correct,
            Verdict::Wrong => AttemptStatus::Wrong,
        }
    }
}

/// What a call to [`Progression::proceed`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moved to the next challenge.
    Advanced,
    /// Reset for another attempt at the same challenge.
    Retried,
    /// Nothing graded yet, or the lesson is already complete.
    Ignored,
}

/// Mutable session state for one lesson attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progression {
    total: usize,
    active_index: usize,
    selected_option: Option<OptionId>,
    text_input: String,
    status: AttemptStatus,
    wrong_attempts: u32,
    reveal_answer: bool,
}

impl Progression {
    /// Start at `start_index`, clamped into `0..=total`.
    #[must_use]
    pub fn new(total: usize, start_index: usize) -> Self {
        Self {
            total,
            active_index: start_index.min(total),
            selected_option: None,
            text_input: String::new(),
            status: AttemptStatus::Unanswered,
            wrong_attempts: 0,
            reveal_answer: false,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn active_index(&self) -> usize {
        self.active_index
    }

    #[must_use]
    pub fn selected_option(&self) -> Option<OptionId> {
        self.selected_option
    }

    #[must_use]
    pub fn text_input(&self) -> &str {
        &self.text_input
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    /// Wrong verdicts on the active challenge since the last advance.
    #[must_use]
    pub fn wrong_attempts(&self) -> u32 {
        self.wrong_attempts
    }

    #[must_use]
    pub fn reveal_answer(&self) -> bool {
        self.reveal_answer
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.active_index >= self.total
    }

    /// `100 * active_index / total`; a lesson without challenges counts as done.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.active_index as f64 / self.total as f64;
        ratio * 100.0
    }

    fn accepts_input(&self) -> bool {
        self.status == AttemptStatus::Unanswered && !self.is_completed()
    }

    /// Record the learner's pending choice. Locked once the attempt is graded.
    pub fn select(&mut self, option: OptionId) -> bool {
        if !self.accepts_input() {
            return false;
        }
        self.selected_option = Some(option);
        true
    }

    /// Record the pending free-text answer. Locked once the attempt is graded.
    pub fn set_text_input(&mut self, text: impl Into<String>) -> bool {
        if !self.accepts_input() {
            return false;
        }
        self.text_input = text.into();
        true
    }

    /// Record a verdict for the current attempt.
    ///
    /// Only an unanswered attempt can be graded; anything else is ignored.
    pub fn check(&mut self, verdict: Verdict) -> bool {
        if !self.accepts_input() {
            return false;
        }

        self.status = verdict.into();
        if verdict == Verdict::Wrong {
            self.wrong_attempts = self.wrong_attempts.saturating_add(1);
            if self.wrong_attempts >= REVEAL_THRESHOLD {
                self.reveal_answer = true;
            }
        }
        true
    }

    /// Continue after grading: retry on `Wrong`, advance on `Correct`.
    pub fn proceed(&mut self) -> Transition {
        match self.status {
            AttemptStatus::Unanswered => Transition::Ignored,
            AttemptStatus::Wrong => {
                self.reset_attempt();
                Transition::Retried
            }
            AttemptStatus::Correct => {
                self.reset_attempt();
                self.active_index = (self.active_index + 1).min(self.total);
                self.wrong_attempts = 0;
                self.reveal_answer = false;
                Transition::Advanced
            }
        }
    }

    fn reset_attempt(&mut self) {
        self.status = AttemptStatus::Unanswered;
        self.selected_option = None;
        self.text_input.clear();
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
