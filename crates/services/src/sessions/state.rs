use quiz_core::model::OptionId;
use quiz_core::progression::AttemptStatus;
use serde::Serialize;

/// Read-only view of a running lesson session, useful for UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub active_index: usize,
    pub total: usize,
    pub selected_option: Option<OptionId>,
    pub text_input: String,
    pub status: AttemptStatus,
    pub hearts: u32,
    pub percentage: f64,
    pub wrong_attempt_count: u32,
    pub reveal_answer: bool,
    pub is_completed: bool,
    pub is_practice: bool,
}
