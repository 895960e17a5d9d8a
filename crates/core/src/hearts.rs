//! Hearts ledger: the consumable lives of a learner within a session.
//!
//! The ledger only decides. Persisting a deduction and surfacing the
//! depleted / unlimited notices are left to the caller.

use serde::{Deserialize, Serialize};

/// Upper bound for a refilled hearts balance.
pub const MAX_HEARTS: u32 = 5;

/// Why a wrong answer did or did not cost a heart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartCharge {
    /// Practice replay; hearts are never charged.
    Practice,
    /// Active subscription; hearts are unlimited.
    Unlimited,
    /// One heart deducted locally and remotely.
    Deducted,
    /// Last heart: the remote deduction runs, the local count is kept and the
    /// session is expected to halt.
    LastHeart,
    /// Nothing left to deduct.
    Exhausted,
}

/// Decision for a single wrong answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongAnswerOutcome {
    pub new_hearts: u32,
    pub should_notify_depleted: bool,
    pub charge: HeartCharge,
}

impl WrongAnswerOutcome {
    /// Whether the heart-deduction persistence call must fire for this decision.
    #[must_use]
    pub fn requires_persistence(&self) -> bool {
        matches!(self.charge, HeartCharge::Deducted | HeartCharge::LastHeart)
    }

    /// Whether the caller should show the "unlimited hearts" informational notice.
    #[must_use]
    pub fn unlimited_notice(&self) -> bool {
        self.charge == HeartCharge::Unlimited
    }
}

/// Local cache of the learner's hearts balance.
///
/// The server is authoritative; this count may drift until the next reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartsLedger {
    hearts: u32,
}

impl HeartsLedger {
    #[must_use]
    pub fn new(hearts: u32) -> Self {
        Self { hearts }
    }

    #[must_use]
    pub fn hearts(&self) -> u32 {
        self.hearts
    }

    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.hearts == 0
    }

    /// Pure decision for a wrong answer given the current balance.
    #[must_use]
    pub fn decide_wrong_answer(
        current_hearts: u32,
        is_practice: bool,
        has_active_subscription: bool,
    ) -> WrongAnswerOutcome {
        let (new_hearts, should_notify_depleted, charge) = if is_practice {
            (current_hearts, false, HeartCharge::Practice)
        } else if has_active_subscription {
            (current_hearts, false, HeartCharge::Unlimited)
        } else {
            match current_hearts {
                0 => (0, true, HeartCharge::Exhausted),
                1 => (1, true, HeartCharge::LastHeart),
                n => (n - 1, false, HeartCharge::Deducted),
            }
        };

        WrongAnswerOutcome {
            new_hearts,
            should_notify_depleted,
            charge,
        }
    }

    /// Decide and apply a wrong answer to the cached balance.
    pub fn apply_wrong_answer(
        &mut self,
        is_practice: bool,
        has_active_subscription: bool,
    ) -> WrongAnswerOutcome {
        let outcome = Self::decide_wrong_answer(self.hearts, is_practice, has_active_subscription);
        self.hearts = outcome.new_hearts;
        outcome
    }

    /// Replace the cached balance after the learner refilled, clamped to [`MAX_HEARTS`].
    pub fn refill(&mut self, hearts: u32) -> u32 {
        self.hearts = hearts.min(MAX_HEARTS);
        self.hearts
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
