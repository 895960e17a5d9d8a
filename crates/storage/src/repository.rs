use async_trait::async_trait;
use quiz_core::hearts::MAX_HEARTS;
use quiz_core::model::{
    ChallengeId, ChallengeSet, LearnerId, LessonId, LessonSnapshot, Subscription,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Loads the challenge set of a lesson together with the learner's progress.
#[async_trait]
pub trait LessonRepository: Send + Sync {
    /// Fetch a lesson as seen by `learner`: per-challenge `completed` flags,
    /// current hearts and completion percentage.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the lesson or learner is missing.
    async fn load_lesson(
        &self,
        learner: LearnerId,
        lesson: LessonId,
    ) -> Result<LessonSnapshot, StorageError>;

    /// Insert or replace a lesson and all of its challenges and options.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lesson cannot be stored.
    async fn upsert_lesson(&self, set: &ChallengeSet) -> Result<(), StorageError>;
}

/// Server-authoritative hearts balance.
#[async_trait]
pub trait HeartsRepository: Send + Sync {
    /// Create the learner's balance with `hearts` unless one already exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the balance cannot be stored.
    async fn init_learner(&self, learner: LearnerId, hearts: u32) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner has no balance.
    async fn get_hearts(&self, learner: LearnerId) -> Result<u32, StorageError>;

    /// Deduct one heart for a wrong answer on `challenge`, floored at zero.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner has no balance.
    async fn reduce_hearts(
        &self,
        learner: LearnerId,
        challenge: ChallengeId,
    ) -> Result<(), StorageError>;

    /// Restore the balance to the maximum and return it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the learner has no balance.
    async fn refill_hearts(&self, learner: LearnerId) -> Result<u32, StorageError>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Current subscription of `learner`; learners without a record are inactive.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn subscription(&self, learner: LearnerId) -> Result<Subscription, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the subscription cannot be stored.
    async fn set_subscription(
        &self,
        learner: LearnerId,
        subscription: Subscription,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ChallengeProgressRepository: Send + Sync {
    /// Mark `challenge` as passed by `learner`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the progress cannot be stored.
    async fn mark_completed(
        &self,
        learner: LearnerId,
        challenge: ChallengeId,
    ) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    lessons: Arc<Mutex<HashMap<LessonId, ChallengeSet>>>,
    hearts: Arc<Mutex<HashMap<LearnerId, u32>>>,
    subscriptions: Arc<Mutex<HashMap<LearnerId, Subscription>>>,
    progress: Arc<Mutex<HashSet<(LearnerId, ChallengeId)>>>,
}

fn poisoned<E: std::fmt::Display>(err: E) -> StorageError {
    StorageError::Connection(err.to_string())
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `learner` has passed `challenge`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn is_completed(
        &self,
        learner: LearnerId,
        challenge: ChallengeId,
    ) -> Result<bool, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.contains(&(learner, challenge)))
    }
}

#[async_trait]
impl LessonRepository for InMemoryRepository {
    async fn load_lesson(
        &self,
        learner: LearnerId,
        lesson: LessonId,
    ) -> Result<LessonSnapshot, StorageError> {
        let set = {
            let guard = self.lessons.lock().map_err(poisoned)?;
            guard.get(&lesson).cloned().ok_or(StorageError::NotFound)?
        };
        let hearts = self.get_hearts(learner).await?;

        let completed = self.progress.lock().map_err(poisoned)?.clone();
        let challenges = set
            .challenges()
            .iter()
            .cloned()
            .map(|mut challenge| {
                challenge.completed = completed.contains(&(learner, challenge.id));
                challenge
            })
            .collect();
        let set = ChallengeSet::new(lesson, challenges)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let percentage = LessonSnapshot::completed_percentage(&set);

        Ok(LessonSnapshot::new(set, hearts, percentage))
    }

    async fn upsert_lesson(&self, set: &ChallengeSet) -> Result<(), StorageError> {
        let mut guard = self.lessons.lock().map_err(poisoned)?;
        guard.insert(set.lesson_id(), set.clone());
        Ok(())
    }
}

#[async_trait]
impl HeartsRepository for InMemoryRepository {
    async fn init_learner(&self, learner: LearnerId, hearts: u32) -> Result<(), StorageError> {
        let mut guard = self.hearts.lock().map_err(poisoned)?;
        guard.entry(learner).or_insert(hearts);
        Ok(())
    }

    async fn get_hearts(&self, learner: LearnerId) -> Result<u32, StorageError> {
        let guard = self.hearts.lock().map_err(poisoned)?;
        guard.get(&learner).copied().ok_or(StorageError::NotFound)
    }

    async fn reduce_hearts(
        &self,
        learner: LearnerId,
        _challenge: ChallengeId,
    ) -> Result<(), StorageError> {
        let mut guard = self.hearts.lock().map_err(poisoned)?;
        let hearts = guard.get_mut(&learner).ok_or(StorageError::NotFound)?;
        *hearts = hearts.saturating_sub(1);
        Ok(())
    }

    async fn refill_hearts(&self, learner: LearnerId) -> Result<u32, StorageError> {
        let mut guard = self.hearts.lock().map_err(poisoned)?;
        let hearts = guard.get_mut(&learner).ok_or(StorageError::NotFound)?;
        *hearts = MAX_HEARTS;
        Ok(*hearts)
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryRepository {
    async fn subscription(&self, learner: LearnerId) -> Result<Subscription, StorageError> {
        let guard = self.subscriptions.lock().map_err(poisoned)?;
        Ok(guard.get(&learner).copied().unwrap_or_default())
    }

    async fn set_subscription(
        &self,
        learner: LearnerId,
        subscription: Subscription,
    ) -> Result<(), StorageError> {
        let mut guard = self.subscriptions.lock().map_err(poisoned)?;
        guard.insert(learner, subscription);
        Ok(())
    }
}

#[async_trait]
impl ChallengeProgressRepository for InMemoryRepository {
    async fn mark_completed(
        &self,
        learner: LearnerId,
        challenge: ChallengeId,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.insert((learner, challenge));
        Ok(())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub lessons: Arc<dyn LessonRepository>,
    pub hearts: Arc<dyn HeartsRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub progress: Arc<dyn ChallengeProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(&InMemoryRepository::new())
    }

    /// Share one in-memory repository across all slots.
    #[must_use]
    pub fn from_in_memory(repo: &InMemoryRepository) -> Self {
        Self {
            lessons: Arc::new(repo.clone()),
            hearts: Arc::new(repo.clone()),
            subscriptions: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{Challenge, ChallengeKind};

    fn challenge(id: u64, order: u32) -> Challenge {
        Challenge {
            id: ChallengeId::new(id),
            order,
            kind: ChallengeKind::Select,
            question: format!("Q{id}"),
            options: Vec::new(),
            correct_answer: None,
            completed: false,
        }
    }

    fn lesson() -> ChallengeSet {
        ChallengeSet::new(LessonId::new(1), vec![challenge(1, 1), challenge(2, 2)]).unwrap()
    }

    #[tokio::test]
    async fn load_lesson_reflects_progress_and_hearts() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::new(7);
        repo.upsert_lesson(&lesson()).await.unwrap();
        repo.init_learner(learner, 5).await.unwrap();
        repo.mark_completed(learner, ChallengeId::new(1)).await.unwrap();

        let snapshot = repo.load_lesson(learner, LessonId::new(1)).await.unwrap();
        assert_eq!(snapshot.hearts, 5);
        assert!(snapshot.challenge_set.challenges()[0].completed);
        assert!(!snapshot.challenge_set.challenges()[1].completed);
        assert!((snapshot.percentage - 50.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.challenge_set.start_index(), 1);
    }

    #[tokio::test]
    async fn progress_is_scoped_per_learner() {
        let repo = InMemoryRepository::new();
        repo.upsert_lesson(&lesson()).await.unwrap();
        repo.init_learner(LearnerId::new(1), 5).await.unwrap();
        repo.init_learner(LearnerId::new(2), 5).await.unwrap();
        repo.mark_completed(LearnerId::new(1), ChallengeId::new(1))
            .await
            .unwrap();

        let other = repo
            .load_lesson(LearnerId::new(2), LessonId::new(1))
            .await
            .unwrap();
        assert!((other.percentage - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn missing_lesson_is_not_found() {
        let repo = InMemoryRepository::new();
        repo.init_learner(LearnerId::new(1), 5).await.unwrap();
        let err = repo
            .load_lesson(LearnerId::new(1), LessonId::new(99))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn reduce_hearts_floors_at_zero() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::new(1);
        repo.init_learner(learner, 1).await.unwrap();
        repo.reduce_hearts(learner, ChallengeId::new(1)).await.unwrap();
        repo.reduce_hearts(learner, ChallengeId::new(1)).await.unwrap();
        assert_eq!(repo.get_hearts(learner).await.unwrap(), 0);

        assert_eq!(repo.refill_hearts(learner).await.unwrap(), MAX_HEARTS);
    }

    #[tokio::test]
    async fn init_learner_keeps_existing_balance() {
        let repo = InMemoryRepository::new();
        let learner = LearnerId::new(1);
        repo.init_learner(learner, 2).await.unwrap();
        repo.init_learner(learner, 5).await.unwrap();
        assert_eq!(repo.get_hearts(learner).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_learner_has_inactive_subscription() {
        let repo = InMemoryRepository::new();
        let sub = repo.subscription(LearnerId::new(3)).await.unwrap();
        assert!(!sub.is_active);

        repo.set_subscription(LearnerId::new(3), Subscription::active())
            .await
            .unwrap();
        assert!(repo.subscription(LearnerId::new(3)).await.unwrap().is_active);
    }
}
