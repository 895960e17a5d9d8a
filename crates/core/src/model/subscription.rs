use serde::{Deserialize, Serialize};

/// Subscription status of a learner. Read-only input to a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub is_active: bool,
}

impl Subscription {
    #[must_use]
    pub fn active() -> Self {
        Self { is_active: true }
    }

    #[must_use]
    pub fn inactive() -> Self {
        Self { is_active: false }
    }
}
