use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::LessonId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonSummaryError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,
}

/// Aggregate summary for a finished lesson attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    lesson_id: LessonId,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    total_challenges: u32,
    wrong_attempts: u32,
    hearts_remaining: u32,
    practice: bool,
}

impl LessonSummary {
    /// # Errors
    ///
    /// Returns `LessonSummaryError::InvalidTimeRange` if `completed_at` is before `started_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lesson_id: LessonId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        total_challenges: u32,
        wrong_attempts: u32,
        hearts_remaining: u32,
        practice: bool,
    ) -> Result<Self, LessonSummaryError> {
        if completed_at < started_at {
            return Err(LessonSummaryError::InvalidTimeRange);
        }

        Ok(Self {
            lesson_id,
            started_at,
            completed_at,
            total_challenges,
            wrong_attempts,
            hearts_remaining,
            practice,
        })
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn total_challenges(&self) -> u32 {
        self.total_challenges
    }

    /// Wrong verdicts across the whole lesson, including retried challenges.
    #[must_use]
    pub fn wrong_attempts(&self) -> u32 {
        self.wrong_attempts
    }

    #[must_use]
    pub fn hearts_remaining(&self) -> u32 {
        self.hearts_remaining
    }

    #[must_use]
    pub fn practice(&self) -> bool {
        self.practice
    }

    /// Share of first-try passes, in percent.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let attempts = self.total_challenges + self.wrong_attempts;
        if attempts == 0 {
            return 100.0;
        }
        f64::from(self.total_challenges) / f64::from(attempts) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn rejects_inverted_time_range() {
        let now = fixed_now();
        let err = LessonSummary::new(LessonId::new(1), now, now - Duration::seconds(1), 3, 0, 5, false)
            .unwrap_err();
        assert_eq!(err, LessonSummaryError::InvalidTimeRange);
    }

    #[test]
    fn accuracy_counts_wrong_attempts() {
        let now = fixed_now();
        let summary = LessonSummary::new(LessonId::new(1), now, now, 3, 1, 4, false).unwrap();
        assert!((summary.accuracy() - 75.0).abs() < f64::EPSILON);
        assert_eq!(summary.hearts_remaining(), 4);
    }
}
