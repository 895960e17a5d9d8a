use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use quiz_core::Clock;
use quiz_core::hearts::{HeartsLedger, WrongAnswerOutcome};
use quiz_core::model::{
    Challenge, ChallengeId, ChallengeSet, GradingRule, LearnerId, LessonSnapshot, LessonSummary,
    OptionId,
};
use quiz_core::progression::{AttemptStatus, Progression, Transition, Verdict};
use storage::repository::{ChallengeProgressRepository, HeartsRepository, SubscriptionRepository};
use tokio::task::JoinHandle;

use super::state::SessionState;
use crate::error::QuizError;
use crate::feedback::FeedbackSink;
use crate::validator::{AnswerValidator, GradingTicket, Submission, Validation};

/// Collaborators a session talks to while it runs.
#[derive(Clone)]
pub struct SessionDeps {
    pub hearts: Arc<dyn HeartsRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub progress: Arc<dyn ChallengeProgressRepository>,
    pub feedback: Arc<dyn FeedbackSink>,
}

/// What a call to [`SessionController::on_check`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Graded {
        verdict: Verdict,
        hearts: Option<WrongAnswerOutcome>,
    },
    /// The active challenge is not graded automatically.
    Ungraded,
    /// A previous grading is still in flight.
    Dropped,
    /// Nothing to grade: missing input, already graded, or lesson complete.
    Ignored,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Drives one learner through one lesson attempt.
///
/// Owns the progression state, the cached hearts balance and the answer
/// validator. Heart deductions and progress writes run as a background task
/// whose failures are logged and never roll back local state.
pub struct SessionController {
    learner: LearnerId,
    challenges: ChallengeSet,
    progression: Progression,
    ledger: HeartsLedger,
    practice: bool,
    awaiting_refill: bool,
    validator: AnswerValidator,
    deps: SessionDeps,
    clock: Clock,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    total_wrong: u32,
    in_flight: Option<JoinHandle<()>>,
}

impl SessionController {
    /// Start at the first uncompleted challenge of `snapshot`.
    ///
    /// A snapshot reporting 100% completion is replayed as practice.
    #[must_use]
    pub fn new(learner: LearnerId, snapshot: LessonSnapshot, deps: SessionDeps, clock: Clock) -> Self {
        let practice = snapshot.is_practice();
        let challenges = snapshot.challenge_set;
        let progression = Progression::new(challenges.len(), challenges.start_index());
        let ledger = HeartsLedger::new(snapshot.hearts);

        Self {
            learner,
            progression,
            ledger,
            practice,
            awaiting_refill: !practice && ledger.is_depleted(),
            validator: AnswerValidator::new(Arc::clone(&deps.feedback)),
            deps,
            clock,
            started_at: clock.now(),
            completed_at: None,
            total_wrong: 0,
            in_flight: None,
            challenges,
        }
    }

    #[must_use]
    pub fn learner(&self) -> LearnerId {
        self.learner
    }

    #[must_use]
    pub fn challenges(&self) -> &ChallengeSet {
        &self.challenges
    }

    #[must_use]
    pub fn progression(&self) -> &Progression {
        &self.progression
    }

    #[must_use]
    pub fn active_challenge(&self) -> Option<&Challenge> {
        self.challenges.get(self.progression.active_index())
    }

    #[must_use]
    pub fn hearts(&self) -> u32 {
        self.ledger.hearts()
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.progression.percentage()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.progression.is_completed()
    }

    #[must_use]
    pub fn is_practice(&self) -> bool {
        self.practice
    }

    /// Set after a depletion signal until hearts are refilled. Callers should
    /// hold back checks and continues meanwhile.
    #[must_use]
    pub fn awaiting_refill(&self) -> bool {
        self.awaiting_refill
    }

    #[must_use]
    pub fn is_grading(&self) -> bool {
        self.validator.is_busy()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState {
            active_index: self.progression.active_index(),
            total: self.progression.total(),
            selected_option: self.progression.selected_option(),
            text_input: self.progression.text_input().to_owned(),
            status: self.progression.status(),
            hearts: self.ledger.hearts(),
            percentage: self.progression.percentage(),
            wrong_attempt_count: self.progression.wrong_attempts(),
            reveal_answer: self.progression.reveal_answer(),
            is_completed: self.progression.is_completed(),
            is_practice: self.practice,
        }
    }

    /// Select an option of the active challenge. Ignored once graded or when
    /// the option does not belong to the challenge.
    pub fn on_select(&mut self, option: OptionId) -> bool {
        let known = self
            .active_challenge()
            .is_some_and(|challenge| challenge.option(option).is_some());
        if !known {
            log::debug!("ignoring selection of unknown option {option}");
            return false;
        }
        self.progression.select(option)
    }

    /// Set the pending free-text answer. Ignored once graded.
    pub fn on_text_input(&mut self, text: impl Into<String>) -> bool {
        self.progression.set_text_input(text)
    }

    /// Grade the pending answer of the active challenge.
    ///
    /// The subscription is read fresh on every call. Feedback is emitted
    /// before the verdict is recorded.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Storage` if the subscription cannot be read; the
    /// attempt is left unanswered.
    pub async fn on_check(&mut self) -> Result<CheckOutcome, QuizError> {
        // a repeated check while the last one is still settling
        if self.validator.is_busy() {
            log::debug!(
                "dropping check at challenge {}: grading in flight",
                self.progression.active_index()
            );
            return Ok(CheckOutcome::Dropped);
        }
        if self.progression.status() != AttemptStatus::Unanswered {
            return Ok(CheckOutcome::Ignored);
        }
        let Some(challenge) = self.challenges.get(self.progression.active_index()) else {
            return Ok(CheckOutcome::Ignored);
        };

        let submission = match challenge.grading_rule() {
            GradingRule::Option => match self.progression.selected_option() {
                Some(option) => Submission::Option(option),
                None => return Ok(CheckOutcome::Ignored),
            },
            GradingRule::Text => {
                let text = self.progression.text_input();
                if text.trim().is_empty() {
                    return Ok(CheckOutcome::Ignored);
                }
                Submission::Text(text.to_owned())
            }
            GradingRule::Ungraded => return Ok(CheckOutcome::Ungraded),
        };

        let subscription = self.deps.subscriptions.subscription(self.learner).await?;
        let challenge_id = challenge.id;

        let graded = match self.validator.validate(
            challenge,
            &submission,
            &mut self.ledger,
            self.practice,
            subscription,
        ) {
            Validation::Graded(graded) => graded,
            Validation::NoVerdict => return Ok(CheckOutcome::Ungraded),
            Validation::Busy => return Ok(CheckOutcome::Dropped),
        };

        self.progression.check(graded.verdict);

        let deduct = graded.hearts.is_some_and(|h| h.requires_persistence());
        if let Some(hearts) = graded.hearts {
            self.total_wrong = self.total_wrong.saturating_add(1);
            if hearts.should_notify_depleted {
                self.awaiting_refill = true;
            }
        }
        let complete = graded.verdict == Verdict::Correct;
        self.spawn_side_effects(challenge_id, deduct, complete, graded.ticket);

        Ok(CheckOutcome::Graded {
            verdict: graded.verdict,
            hearts: graded.hearts,
        })
    }

    /// Pass an ungraded challenge (e.g. ordering) without feedback or heart cost.
    pub async fn on_skip_ungraded(&mut self) -> bool {
        let Some(challenge) = self.active_challenge() else {
            return false;
        };
        if challenge.grading_rule() != GradingRule::Ungraded {
            return false;
        }
        let challenge_id = challenge.id;

        let Some(ticket) = self.validator.guard().try_acquire() else {
            return false;
        };
        if !self.progression.check(Verdict::Correct) {
            return false;
        }
        self.spawn_side_effects(challenge_id, false, true, ticket);
        true
    }

    /// Retry after a wrong answer or advance after a correct one.
    ///
    /// Held back (`Transition::Ignored`) until the side effects of the last
    /// grading have settled.
    pub fn on_continue(&mut self) -> Transition {
        if self.validator.is_busy() {
            log::debug!("holding back continue: grading in flight");
            return Transition::Ignored;
        }
        let transition = self.progression.proceed();
        if transition == Transition::Advanced
            && self.progression.is_completed()
            && self.completed_at.is_none()
        {
            self.completed_at = Some(self.clock.now());
            log::info!(
                "lesson {} completed by learner {}",
                self.challenges.lesson_id(),
                self.learner
            );
        }
        transition
    }

    /// Replace the cached hearts after the learner refilled them.
    pub fn on_hearts_refilled(&mut self, hearts: u32) -> u32 {
        let hearts = self.ledger.refill(hearts);
        if hearts > 0 {
            self.awaiting_refill = false;
        }
        hearts
    }

    /// Wait for the in-flight side-effect task, if any.
    pub async fn settle(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if let Err(err) = handle.await {
                log::warn!("session side effects aborted: {err}");
            }
        }
    }

    /// Summary of the finished lesson.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NotCompleted` before the last challenge was passed.
    pub fn summary(&self) -> Result<LessonSummary, QuizError> {
        let completed_at = self.completed_at.ok_or(QuizError::NotCompleted)?;
        let total = u32::try_from(self.challenges.len()).unwrap_or(u32::MAX);
        Ok(LessonSummary::new(
            self.challenges.lesson_id(),
            self.started_at,
            completed_at,
            total,
            self.total_wrong,
            self.ledger.hearts(),
            self.practice,
        )?)
    }

    fn spawn_side_effects(
        &mut self,
        challenge: ChallengeId,
        deduct: bool,
        complete: bool,
        ticket: GradingTicket,
    ) {
        if !deduct && !complete {
            return;
        }

        let learner = self.learner;
        let hearts = Arc::clone(&self.deps.hearts);
        let progress = Arc::clone(&self.deps.progress);
        let handle = tokio::spawn(async move {
            // released once both writes settled, whatever their outcome
            let _ticket = ticket;
            if deduct {
                if let Err(err) = hearts.reduce_hearts(learner, challenge).await {
                    log::warn!("failed to persist heart deduction for challenge {challenge}: {err}");
                }
            }
            if complete {
                if let Err(err) = progress.mark_completed(learner, challenge).await {
                    log::warn!("failed to record progress for challenge {challenge}: {err}");
                }
            }
        });
        self.in_flight = Some(handle);
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("learner", &self.learner)
            .field("lesson_id", &self.challenges.lesson_id())
            .field("progression", &self.progression)
            .field("hearts", &self.ledger.hearts())
            .field("practice", &self.practice)
            .field("started_at", &self.started_at)
            .field("completed_at", &self.completed_at)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{FeedbackEvent, RecordingFeedback};
    use async_trait::async_trait;
    use quiz_core::hearts::{HeartCharge, MAX_HEARTS};
    use quiz_core::model::{ChallengeKind, ChallengeOption, LessonId, Subscription};
    use quiz_core::time::fixed_clock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use storage::repository::{InMemoryRepository, StorageError};
    use tokio::sync::Notify;

    const LEARNER_ID: u64 = 1;

    fn learner() -> LearnerId {
        LearnerId::new(LEARNER_ID)
    }

    fn select(id: u64, order: u32) -> Challenge {
        let challenge_id = ChallengeId::new(id);
        Challenge {
            id: challenge_id,
            order,
            kind: ChallengeKind::Select,
            question: format!("Q{id}"),
            options: vec![
                ChallengeOption {
                    id: right(id),
                    challenge_id,
                    text: "right".into(),
                    correct: true,
                    order: None,
                },
                ChallengeOption {
                    id: wrong(id),
                    challenge_id,
                    text: "wrong".into(),
                    correct: false,
                    order: None,
                },
            ],
            correct_answer: None,
            completed: false,
        }
    }

    fn fill_blank(id: u64, order: u32) -> Challenge {
        Challenge {
            id: ChallengeId::new(id),
            order,
            kind: ChallengeKind::FillBlank,
            question: "AWS stands for".into(),
            options: Vec::new(),
            correct_answer: Some("Amazon Web Services".into()),
            completed: false,
        }
    }

    fn right(challenge: u64) -> OptionId {
        OptionId::new(challenge * 10 + 1)
    }

    fn wrong(challenge: u64) -> OptionId {
        OptionId::new(challenge * 10 + 2)
    }

    fn three_selects() -> ChallengeSet {
        ChallengeSet::new(LessonId::new(1), vec![select(1, 1), select(2, 2), select(3, 3)]).unwrap()
    }

    struct Harness {
        repo: InMemoryRepository,
        feedback: Arc<RecordingFeedback>,
    }

    impl Harness {
        async fn new(hearts: u32) -> Self {
            let repo = InMemoryRepository::new();
            repo.init_learner(learner(), hearts).await.unwrap();
            Self {
                repo,
                feedback: Arc::new(RecordingFeedback::new()),
            }
        }

        fn deps(&self) -> SessionDeps {
            self.deps_with_hearts(Arc::new(self.repo.clone()))
        }

        fn deps_with_hearts(&self, hearts: Arc<dyn HeartsRepository>) -> SessionDeps {
            SessionDeps {
                hearts,
                subscriptions: Arc::new(self.repo.clone()),
                progress: Arc::new(self.repo.clone()),
                feedback: self.feedback.clone(),
            }
        }

        fn session(&self, set: ChallengeSet, hearts: u32, percentage: f64) -> SessionController {
            let snapshot = LessonSnapshot::new(set, hearts, percentage);
            SessionController::new(learner(), snapshot, self.deps(), fixed_clock())
        }
    }

    async fn answer(session: &mut SessionController, option: OptionId) -> CheckOutcome {
        assert!(session.on_select(option));
        let outcome = session.on_check().await.unwrap();
        session.settle().await;
        outcome
    }

    fn verdict(outcome: CheckOutcome) -> Option<Verdict> {
        match outcome {
            CheckOutcome::Graded { verdict, .. } => Some(verdict),
            _ => None,
        }
    }

    #[tokio::test]
    async fn walks_through_a_lesson_with_retries() {
        let harness = Harness::new(5).await;
        let mut session = harness.session(three_selects(), 5, 0.0);

        // challenge 1: straight pass
        let outcome = answer(&mut session, right(1)).await;
        assert_eq!(verdict(outcome), Some(Verdict::Correct));
        assert_eq!(session.on_continue(), Transition::Advanced);
        assert_eq!(session.progression().active_index(), 1);
        assert_eq!(session.hearts(), 5);
        assert_eq!(session.progression().status(), AttemptStatus::Unanswered);

        // challenge 2: three misses
        for attempt in 1..=3 {
            let outcome = answer(&mut session, wrong(2)).await;
            assert_eq!(verdict(outcome), Some(Verdict::Wrong));
            assert_eq!(session.progression().wrong_attempts(), attempt);
            if attempt < 3 {
                assert!(!session.progression().reveal_answer());
                assert_eq!(session.on_continue(), Transition::Retried);
            }
        }
        assert!(session.progression().reveal_answer());
        assert_eq!(session.hearts(), 2);
        assert_eq!(session.progression().active_index(), 1);
        assert_eq!(harness.repo.get_hearts(learner()).await.unwrap(), 2);

        assert_eq!(session.on_continue(), Transition::Retried);
        answer(&mut session, right(2)).await;
        assert_eq!(session.on_continue(), Transition::Advanced);
        assert_eq!(session.progression().wrong_attempts(), 0);
        assert!(!session.progression().reveal_answer());

        // challenge 3
        answer(&mut session, right(3)).await;
        session.on_continue();
        assert!(session.is_completed());
        assert!((session.percentage() - 100.0).abs() < f64::EPSILON);
        assert_eq!(session.progression().active_index(), 3);

        assert!(harness.repo.is_completed(learner(), ChallengeId::new(3)).unwrap());
        let summary = session.summary().unwrap();
        assert_eq!(summary.total_challenges(), 3);
        assert_eq!(summary.wrong_attempts(), 3);
        assert_eq!(summary.hearts_remaining(), 2);
    }

    #[tokio::test]
    async fn last_heart_signals_depletion_without_local_decrement() {
        let harness = Harness::new(1).await;
        let mut session = harness.session(three_selects(), 1, 0.0);

        let outcome = answer(&mut session, wrong(1)).await;
        let CheckOutcome::Graded {
            hearts: Some(hearts),
            ..
        } = outcome
        else {
            panic!("expected a charged wrong answer, got {outcome:?}");
        };
        assert!(hearts.should_notify_depleted);
        assert_eq!(hearts.charge, HeartCharge::LastHeart);
        assert_eq!(session.hearts(), 1);
        assert!(session.awaiting_refill());
        // the server-side deduction still ran
        assert_eq!(harness.repo.get_hearts(learner()).await.unwrap(), 0);
        assert_eq!(
            harness.feedback.take(),
            vec![FeedbackEvent::Incorrect, FeedbackEvent::HeartsDepleted]
        );

        assert_eq!(session.on_hearts_refilled(MAX_HEARTS + 3), MAX_HEARTS);
        assert!(!session.awaiting_refill());
    }

    #[tokio::test]
    async fn free_text_answer_is_case_and_whitespace_insensitive() {
        let harness = Harness::new(5).await;
        let set = ChallengeSet::new(LessonId::new(2), vec![fill_blank(1, 1)]).unwrap();
        let mut session = harness.session(set, 5, 0.0);

        assert_eq!(session.on_check().await.unwrap(), CheckOutcome::Ignored);
        session.on_text_input("   ");
        assert_eq!(session.on_check().await.unwrap(), CheckOutcome::Ignored);

        session.on_text_input("  amazon web services ");
        let outcome = session.on_check().await.unwrap();
        assert_eq!(verdict(outcome), Some(Verdict::Correct));
        assert_eq!(harness.feedback.take(), vec![FeedbackEvent::Correct]);
    }

    #[tokio::test]
    async fn check_without_selection_is_ignored() {
        let harness = Harness::new(5).await;
        let mut session = harness.session(three_selects(), 5, 0.0);

        assert_eq!(session.on_check().await.unwrap(), CheckOutcome::Ignored);
        assert_eq!(session.on_continue(), Transition::Ignored);
        assert!(!session.on_select(OptionId::new(999)));
        assert!(harness.feedback.take().is_empty());
        assert_eq!(session.progression().status(), AttemptStatus::Unanswered);
    }

    #[tokio::test]
    async fn selection_is_locked_after_grading() {
        let harness = Harness::new(5).await;
        let mut session = harness.session(three_selects(), 5, 0.0);

        answer(&mut session, wrong(1)).await;
        assert!(!session.on_select(right(1)));
        assert_eq!(session.progression().selected_option(), Some(wrong(1)));
        assert_eq!(session.on_check().await.unwrap(), CheckOutcome::Ignored);
        assert_eq!(session.hearts(), 4);

        session.on_continue();
        assert_eq!(session.progression().selected_option(), None);
        assert!(session.on_select(right(1)));
    }

    #[tokio::test]
    async fn practice_replay_never_costs_hearts() {
        let harness = Harness::new(3).await;
        let mut set = Vec::new();
        for id in 1..=3 {
            let mut challenge = select(id, u32::try_from(id).unwrap());
            challenge.completed = true;
            set.push(challenge);
        }
        let set = ChallengeSet::new(LessonId::new(1), set).unwrap();
        let mut session = harness.session(set, 3, 100.0);

        assert!(session.is_practice());
        assert_eq!(session.progression().active_index(), 0);
        for _ in 0..5 {
            answer(&mut session, wrong(1)).await;
            session.on_continue();
        }
        assert_eq!(session.hearts(), 3);
        assert_eq!(harness.repo.get_hearts(learner()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn subscription_is_read_on_every_check() {
        let harness = Harness::new(5).await;
        let mut session = harness.session(three_selects(), 5, 0.0);

        answer(&mut session, wrong(1)).await;
        session.on_continue();
        assert_eq!(session.hearts(), 4);

        harness
            .repo
            .set_subscription(learner(), Subscription::active())
            .await
            .unwrap();
        for _ in 0..3 {
            answer(&mut session, wrong(1)).await;
            session.on_continue();
        }
        assert_eq!(session.hearts(), 4);
        assert_eq!(harness.repo.get_hearts(learner()).await.unwrap(), 4);

        let events = harness.feedback.take();
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == FeedbackEvent::UnlimitedHearts)
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn session_starts_at_first_uncompleted_challenge() {
        let harness = Harness::new(5).await;
        let mut first = select(1, 1);
        first.completed = true;
        let set = ChallengeSet::new(LessonId::new(1), vec![first, select(2, 2), select(3, 3)]).unwrap();
        let session = harness.session(set, 5, 33.0);

        assert!(!session.is_practice());
        assert_eq!(session.active_challenge().map(|c| c.id), Some(ChallengeId::new(2)));
    }

    #[tokio::test]
    async fn ordering_challenges_are_not_graded() {
        let harness = Harness::new(5).await;
        let mut ordering = select(1, 1);
        ordering.kind = ChallengeKind::Ordering;
        let set = ChallengeSet::new(LessonId::new(1), vec![ordering, select(2, 2)]).unwrap();
        let mut session = harness.session(set, 5, 0.0);

        session.on_select(right(1));
        assert_eq!(session.on_check().await.unwrap(), CheckOutcome::Ungraded);
        assert_eq!(session.progression().status(), AttemptStatus::Unanswered);

        assert!(session.on_skip_ungraded().await);
        session.settle().await;
        assert_eq!(session.on_continue(), Transition::Advanced);
        assert_eq!(session.hearts(), 5);
        assert!(harness.feedback.take().is_empty());
        assert!(!session.on_skip_ungraded().await);
    }

    #[derive(Default)]
    struct GatedHearts {
        gate: Notify,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HeartsRepository for GatedHearts {
        async fn init_learner(&self, _: LearnerId, _: u32) -> Result<(), StorageError> {
            Ok(())
        }

        async fn get_hearts(&self, _: LearnerId) -> Result<u32, StorageError> {
            Ok(MAX_HEARTS)
        }

        async fn reduce_hearts(&self, _: LearnerId, _: ChallengeId) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(())
        }

        async fn refill_hearts(&self, _: LearnerId) -> Result<u32, StorageError> {
            Ok(MAX_HEARTS)
        }
    }

    #[derive(Default)]
    struct GatedProgress {
        gate: Notify,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ChallengeProgressRepository for GatedProgress {
        async fn mark_completed(&self, _: LearnerId, _: ChallengeId) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn double_check_is_dropped_and_continue_waits_for_deduction() {
        let harness = Harness::new(5).await;
        let gated = Arc::new(GatedHearts::default());
        let snapshot = LessonSnapshot::new(three_selects(), 5, 0.0);
        let mut session = SessionController::new(
            learner(),
            snapshot,
            harness.deps_with_hearts(gated.clone()),
            fixed_clock(),
        );

        session.on_select(wrong(1));
        let first = session.on_check().await.unwrap();
        assert_eq!(verdict(first), Some(Verdict::Wrong));
        assert!(session.is_grading());

        assert_eq!(session.on_check().await.unwrap(), CheckOutcome::Dropped);
        assert_eq!(session.hearts(), 4);
        assert_eq!(harness.feedback.take(), vec![FeedbackEvent::Incorrect]);

        assert_eq!(session.on_continue(), Transition::Ignored);
        assert_eq!(session.progression().status(), AttemptStatus::Wrong);
        assert_eq!(session.progression().active_index(), 0);

        gated.gate.notify_one();
        session.settle().await;
        assert!(!session.is_grading());
        assert_eq!(gated.calls.load(Ordering::SeqCst), 1);

        assert_eq!(session.on_continue(), Transition::Retried);
        session.on_select(wrong(1));
        let retry = session.on_check().await.unwrap();
        assert_eq!(verdict(retry), Some(Verdict::Wrong));
        assert_eq!(session.hearts(), 3);
        gated.gate.notify_one();
        session.settle().await;
        assert_eq!(gated.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn next_challenge_check_is_graded_after_progress_write_settles() {
        let harness = Harness::new(5).await;
        let progress = Arc::new(GatedProgress::default());
        let mut deps = harness.deps();
        deps.progress = progress.clone();
        let snapshot = LessonSnapshot::new(three_selects(), 5, 0.0);
        let mut session = SessionController::new(learner(), snapshot, deps, fixed_clock());

        session.on_select(right(1));
        let first = session.on_check().await.unwrap();
        assert_eq!(verdict(first), Some(Verdict::Correct));

        // the learner cannot reach challenge 2 while the write is pending
        assert_eq!(session.on_continue(), Transition::Ignored);
        assert_eq!(session.progression().active_index(), 0);
        assert!(!session.on_select(right(2)));

        progress.gate.notify_one();
        session.settle().await;
        assert_eq!(session.on_continue(), Transition::Advanced);

        assert!(session.on_select(right(2)));
        let next = session.on_check().await.unwrap();
        assert_eq!(verdict(next), Some(Verdict::Correct));
        assert_eq!(session.progression().active_index(), 1);
        progress.gate.notify_one();
        session.settle().await;
        assert_eq!(progress.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn session_starting_without_hearts_awaits_refill() {
        let harness = Harness::new(0).await;
        let session = harness.session(three_selects(), 0, 0.0);
        assert!(session.awaiting_refill());

        let practice = harness.session(three_selects(), 0, 100.0);
        assert!(!practice.awaiting_refill());

        let healthy = harness.session(three_selects(), 5, 0.0);
        assert!(!healthy.awaiting_refill());
    }

    struct OfflineHearts;

    #[async_trait]
    impl HeartsRepository for OfflineHearts {
        async fn init_learner(&self, _: LearnerId, _: u32) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn get_hearts(&self, _: LearnerId) -> Result<u32, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn reduce_hearts(&self, _: LearnerId, _: ChallengeId) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn refill_hearts(&self, _: LearnerId) -> Result<u32, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    #[tokio::test]
    async fn failed_deduction_keeps_local_hearts_and_releases_guard() {
        let harness = Harness::new(5).await;
        let snapshot = LessonSnapshot::new(three_selects(), 5, 0.0);
        let mut session = SessionController::new(
            learner(),
            snapshot,
            harness.deps_with_hearts(Arc::new(OfflineHearts)),
            fixed_clock(),
        );

        answer(&mut session, wrong(1)).await;
        assert_eq!(session.hearts(), 4);
        assert!(!session.is_grading());

        session.on_continue();
        let outcome = answer(&mut session, wrong(1)).await;
        assert_eq!(verdict(outcome), Some(Verdict::Wrong));
        assert_eq!(session.hearts(), 3);
    }

    #[tokio::test]
    async fn summary_requires_completion() {
        let harness = Harness::new(5).await;
        let set = ChallengeSet::new(LessonId::new(1), vec![select(1, 1)]).unwrap();
        let mut session = harness.session(set, 5, 0.0);

        assert!(matches!(session.summary(), Err(QuizError::NotCompleted)));
        answer(&mut session, right(1)).await;
        assert!(matches!(session.summary(), Err(QuizError::NotCompleted)));
        session.on_continue();

        let summary = session.summary().unwrap();
        assert_eq!(summary.lesson_id(), LessonId::new(1));
        assert!((summary.accuracy() - 100.0).abs() < f64::EPSILON);
        assert_eq!(session.completed_at(), Some(session.started_at()));
    }

    #[tokio::test]
    async fn state_view_mirrors_progression() {
        let harness = Harness::new(5).await;
        let mut session = harness.session(three_selects(), 5, 0.0);
        answer(&mut session, wrong(1)).await;

        let state = session.state();
        assert_eq!(state.active_index, 0);
        assert_eq!(state.total, 3);
        assert_eq!(state.status, AttemptStatus::Wrong);
        assert_eq!(state.selected_option, Some(wrong(1)));
        assert_eq!(state.hearts, 4);
        assert_eq!(state.wrong_attempt_count, 1);
        assert!(!state.is_completed);
    }
}
