mod controller;
mod state;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::QuizError;
pub use controller::{CheckOutcome, SessionController, SessionDeps};
pub use state::SessionState;
pub use workflow::LessonLoopService;
