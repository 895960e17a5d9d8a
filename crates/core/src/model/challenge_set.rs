use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::challenge::Challenge;
use crate::model::ids::{ChallengeId, LessonId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChallengeSetError {
    #[error("lesson {0} has no challenges")]
    Empty(LessonId),

    #[error("challenge {0} appears more than once")]
    DuplicateChallenge(ChallengeId),
}

/// Ordered, read-only list of the challenges of one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawChallengeSet")]
pub struct ChallengeSet {
    lesson_id: LessonId,
    challenges: Vec<Challenge>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChallengeSet {
    lesson_id: LessonId,
    challenges: Vec<Challenge>,
}

impl TryFrom<RawChallengeSet> for ChallengeSet {
    type Error = ChallengeSetError;

    fn try_from(raw: RawChallengeSet) -> Result<Self, Self::Error> {
        Self::new(raw.lesson_id, raw.challenges)
    }
}

impl ChallengeSet {
    /// Build a challenge set, sorting challenges by their `order`.
    ///
    /// # Errors
    ///
    /// Returns `ChallengeSetError::Empty` when no challenges are given and
    /// `ChallengeSetError::DuplicateChallenge` when an id repeats.
    pub fn new(
        lesson_id: LessonId,
        mut challenges: Vec<Challenge>,
    ) -> Result<Self, ChallengeSetError> {
        if challenges.is_empty() {
            return Err(ChallengeSetError::Empty(lesson_id));
        }

        let mut seen = HashSet::with_capacity(challenges.len());
        for challenge in &challenges {
            if !seen.insert(challenge.id) {
                return Err(ChallengeSetError::DuplicateChallenge(challenge.id));
            }
        }

        // stable: equal orders keep their input position
        challenges.sort_by_key(|challenge| challenge.order);

        Ok(Self {
            lesson_id,
            challenges,
        })
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn challenges(&self) -> &[Challenge] {
        &self.challenges
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Challenge> {
        self.challenges.get(index)
    }

    /// Index where a new attempt starts: the first uncompleted challenge, or
    /// `0` when every challenge is already completed (practice replays start over).
    #[must_use]
    pub fn start_index(&self) -> usize {
        self.challenges
            .iter()
            .position(|challenge| !challenge.completed)
            .unwrap_or(0)
    }
}

/// Everything the lesson loader hands over when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSnapshot {
    pub challenge_set: ChallengeSet,
    pub hearts: u32,
    pub percentage: f64,
}

impl LessonSnapshot {
    #[must_use]
    pub fn new(challenge_set: ChallengeSet, hearts: u32, percentage: f64) -> Self {
        Self {
            challenge_set,
            hearts,
            percentage,
        }
    }

    /// Completion percentage derived from the `completed` flags of the challenges.
    #[must_use]
    pub fn completed_percentage(challenge_set: &ChallengeSet) -> f64 {
        let done = challenge_set
            .challenges()
            .iter()
            .filter(|challenge| challenge.completed)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = done as f64 / challenge_set.len() as f64;
        ratio * 100.0
    }

    /// A lesson that was already fully completed is replayed as practice.
    #[must_use]
    pub fn is_practice(&self) -> bool {
        self.percentage >= 100.0
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
