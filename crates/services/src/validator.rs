use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quiz_core::hearts::{HeartsLedger, WrongAnswerOutcome};
use quiz_core::model::{Challenge, GradingRule, OptionId, Subscription};
use quiz_core::progression::Verdict;

use crate::feedback::{FeedbackEvent, FeedbackSink};

//
// ─── GRADING GUARD ─────────────────────────────────────────────────────────────
//

/// Busy flag allowing at most one grading operation in flight.
#[derive(Debug, Clone, Default)]
pub struct GradingGuard {
    busy: Arc<AtomicBool>,
}

impl GradingGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard. Returns `None` while another ticket is alive.
    #[must_use]
    pub fn try_acquire(&self) -> Option<GradingTicket> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GradingTicket {
                busy: Arc::clone(&self.busy),
            })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of a claimed [`GradingGuard`]; releases it when dropped, on every exit path.
#[derive(Debug)]
pub struct GradingTicket {
    busy: Arc<AtomicBool>,
}

impl Drop for GradingTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

//
// ─── SUBMISSION / VALIDATION ───────────────────────────────────────────────────
//

/// An answer as submitted by the learner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Option(OptionId),
    Text(String),
}

/// A graded submission. The ticket keeps the guard claimed until the caller
/// drops it, normally after the follow-up persistence has settled.
#[derive(Debug)]
pub struct GradedAnswer {
    pub verdict: Verdict,
    pub hearts: Option<WrongAnswerOutcome>,
    pub ticket: GradingTicket,
}

#[derive(Debug)]
pub enum Validation {
    Graded(GradedAnswer),
    /// The challenge kind has no automatic grading, or the submission does
    /// not fit it.
    NoVerdict,
    /// Another grading is still in flight; this submission was dropped.
    Busy,
}

/// Case-insensitive comparison of trimmed answers.
#[must_use]
pub fn text_matches(submitted: &str, expected: &str) -> bool {
    submitted.trim().to_lowercase() == expected.trim().to_lowercase()
}

/// Correctness of `submission` against `challenge`, without side effects.
///
/// Returns `None` for ungraded kinds and for submissions of the wrong shape.
#[must_use]
pub fn grade(challenge: &Challenge, submission: &Submission) -> Option<Verdict> {
    let correct = match (challenge.grading_rule(), submission) {
        (GradingRule::Option, Submission::Option(id)) => {
            challenge.option(*id).is_some_and(|option| option.correct)
        }
        (GradingRule::Text, Submission::Text(text)) => challenge
            .correct_answer
            .as_deref()
            .is_some_and(|expected| text_matches(text, expected)),
        _ => return None,
    };

    Some(if correct {
        Verdict::Correct
    } else {
        Verdict::Wrong
    })
}

/// Grades submissions and applies what follows from the verdict: the heart
/// cost of a wrong answer and the feedback signals.
pub struct AnswerValidator {
    guard: GradingGuard,
    feedback: Arc<dyn FeedbackSink>,
}

impl AnswerValidator {
    #[must_use]
    pub fn new(feedback: Arc<dyn FeedbackSink>) -> Self {
        Self {
            guard: GradingGuard::new(),
            feedback,
        }
    }

    #[must_use]
    pub fn guard(&self) -> &GradingGuard {
        &self.guard
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// Grade `submission` and, on a wrong answer, charge `ledger`.
    ///
    /// Feedback is emitted before this returns, so it always precedes the
    /// status update the caller applies with the verdict.
    pub fn validate(
        &self,
        challenge: &Challenge,
        submission: &Submission,
        ledger: &mut HeartsLedger,
        is_practice: bool,
        subscription: Subscription,
    ) -> Validation {
        let Some(ticket) = self.guard.try_acquire() else {
            log::debug!("dropping submission for challenge {}: grading in flight", challenge.id);
            return Validation::Busy;
        };

        let Some(verdict) = grade(challenge, submission) else {
            return Validation::NoVerdict;
        };

        let hearts = match verdict {
            Verdict::Correct => {
                self.feedback.emit(FeedbackEvent::Correct);
                None
            }
            Verdict::Wrong => {
                let outcome = ledger.apply_wrong_answer(is_practice, subscription.is_active);
                if outcome.unlimited_notice() {
                    self.feedback.emit(FeedbackEvent::UnlimitedHearts);
                }
                self.feedback.emit(FeedbackEvent::Incorrect);
                if outcome.should_notify_depleted {
                    self.feedback.emit(FeedbackEvent::HeartsDepleted);
                }
                Some(outcome)
            }
        };

        log::debug!("challenge {} graded {verdict:?}", challenge.id);
        Validation::Graded(GradedAnswer {
            verdict,
            hearts,
            ticket,
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
