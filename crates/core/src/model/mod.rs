mod challenge;
mod challenge_set;
mod ids;
mod subscription;
mod summary;

pub use ids::{ChallengeId, LearnerId, LessonId, OptionId, ParseIdError};

pub use challenge::{Challenge, ChallengeKind, ChallengeOption, GradingRule};
pub use challenge_set::{ChallengeSet, ChallengeSetError, LessonSnapshot};
pub use subscription::Subscription;
pub use summary::{LessonSummary, LessonSummaryError};
