use std::sync::Arc;

use quiz_core::Clock;
use quiz_core::model::{LearnerId, LessonId, LessonSummary};
use storage::repository::Storage;

use super::controller::{SessionController, SessionDeps};
use crate::error::QuizError;
use crate::feedback::{FeedbackSink, NoopFeedback};

/// Builds lesson sessions from storage and runs the storage-backed steps
/// around them.
#[derive(Clone)]
pub struct LessonLoopService {
    clock: Clock,
    storage: Storage,
    feedback: Arc<dyn FeedbackSink>,
}

impl LessonLoopService {
    #[must_use]
    pub fn new(clock: Clock, storage: Storage) -> Self {
        Self {
            clock,
            storage,
            feedback: Arc::new(NoopFeedback),
        }
    }

    #[must_use]
    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = feedback;
        self
    }

    fn deps(&self) -> SessionDeps {
        SessionDeps {
            hearts: Arc::clone(&self.storage.hearts),
            subscriptions: Arc::clone(&self.storage.subscriptions),
            progress: Arc::clone(&self.storage.progress),
            feedback: Arc::clone(&self.feedback),
        }
    }

    /// Load `lesson` for `learner` and start a session on it.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Storage` if the lesson or learner cannot be loaded.
    pub async fn start_lesson(
        &self,
        learner: LearnerId,
        lesson: LessonId,
    ) -> Result<SessionController, QuizError> {
        let snapshot = self.storage.lessons.load_lesson(learner, lesson).await?;
        let session = SessionController::new(learner, snapshot, self.deps(), self.clock);
        log::info!(
            "learner {learner} started lesson {lesson} at challenge {} of {} (practice: {})",
            session.progression().active_index() + 1,
            session.progression().total(),
            session.is_practice()
        );
        Ok(session)
    }

    /// Refill the learner's hearts remotely and update the running session.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Storage` if the refill cannot be persisted.
    pub async fn refill_hearts(&self, session: &mut SessionController) -> Result<u32, QuizError> {
        let hearts = self.storage.hearts.refill_hearts(session.learner()).await?;
        Ok(session.on_hearts_refilled(hearts))
    }

    /// Wait for pending writes and summarize the finished lesson.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NotCompleted` if the lesson is still running.
    pub async fn finish(&self, session: &mut SessionController) -> Result<LessonSummary, QuizError> {
        session.settle().await;
        let summary = session.summary()?;
        log::info!(
            "lesson {} summary: {} challenges, {} wrong attempts, {} hearts left, {}s since start",
            summary.lesson_id(),
            summary.total_challenges(),
            summary.wrong_attempts(),
            summary.hearts_remaining(),
            self.clock.elapsed_since(summary.started_at()).num_seconds()
        );
        Ok(summary)
    }
}
