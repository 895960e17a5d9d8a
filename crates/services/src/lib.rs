#![forbid(unsafe_code)]

pub mod error;
pub mod feedback;
pub mod sessions;
pub mod validator;

pub use quiz_core::Clock;
pub use sessions as session;

pub use error::QuizError;
pub use feedback::{FeedbackEvent, FeedbackSink, NoopFeedback, RecordingFeedback};
pub use sessions::{CheckOutcome, LessonLoopService, SessionController, SessionDeps, SessionState};
pub use validator::{AnswerValidator, GradingGuard, Submission, Validation};
