use serde::{Deserialize, Serialize};

use crate::model::ids::{ChallengeId, OptionId};

//
// ─── CHALLENGE KIND ────────────────────────────────────────────────────────────
//

/// The fixed set of challenge types a lesson can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeKind {
    /// Pick the one correct option out of several.
    Select,
    /// Pick the translation that assists the prompt.
    Assist,
    TrueFalse,
    ImageSelect,
    /// Audio-cued option selection.
    Listening,
    /// Video-cued option selection.
    Video,
    /// Type the missing word or phrase.
    FillBlank,
    /// Say the answer; graded on the transcript.
    Speech,
    /// Put the options in their canonical order.
    Ordering,
}

/// How a submission for a given challenge kind is compared against the answer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingRule {
    /// Correct iff the selected option is flagged correct.
    Option,
    /// Correct iff the trimmed, case-folded text equals the answer.
    Text,
    /// Never graded automatically.
    Ungraded,
}

impl ChallengeKind {
    pub const ALL: [ChallengeKind; 9] = [
        ChallengeKind::Select,
        ChallengeKind::Assist,
        ChallengeKind::TrueFalse,
        ChallengeKind::ImageSelect,
        ChallengeKind::Listening,
        ChallengeKind::Video,
        ChallengeKind::FillBlank,
        ChallengeKind::Speech,
        ChallengeKind::Ordering,
    ];

    #[must_use]
    pub fn grading_rule(self) -> GradingRule {
        match self {
            ChallengeKind::Select
            | ChallengeKind::Assist
            | ChallengeKind::TrueFalse
            | ChallengeKind::ImageSelect
            | ChallengeKind::Listening
            | ChallengeKind::Video => GradingRule::Option,
            ChallengeKind::FillBlank | ChallengeKind::Speech => GradingRule::Text,
            ChallengeKind::Ordering => GradingRule::Ungraded,
        }
    }

    /// Stable storage name, identical to the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeKind::Select => "SELECT",
            ChallengeKind::Assist => "ASSIST",
            ChallengeKind::TrueFalse => "TRUE_FALSE",
            ChallengeKind::ImageSelect => "IMAGE_SELECT",
            ChallengeKind::Listening => "LISTENING",
            ChallengeKind::Video => "VIDEO",
            ChallengeKind::FillBlank => "FILL_BLANK",
            ChallengeKind::Speech => "SPEECH",
            ChallengeKind::Ordering => "ORDERING",
        }
    }

    /// Inverse of [`ChallengeKind::as_str`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

//
// ─── CHALLENGE OPTION ──────────────────────────────────────────────────────────
//

/// One selectable answer of a challenge.
///
/// For [`ChallengeKind::Ordering`] the `order` field defines the canonical
/// sequence and `correct` carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeOption {
    pub id: OptionId,
    pub challenge_id: ChallengeId,
    pub text: String,
    #[serde(default)]
    pub correct: bool,
    #[serde(default)]
    pub order: Option<u32>,
}

//
// ─── CHALLENGE ─────────────────────────────────────────────────────────────────
//

/// A single gradable question within a lesson. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: ChallengeId,
    pub order: u32,
    #[serde(rename = "type")]
    pub kind: ChallengeKind,
    pub question: String,
    #[serde(default)]
    pub options: Vec<ChallengeOption>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl Challenge {
    #[must_use]
    pub fn option(&self, id: OptionId) -> Option<&ChallengeOption> {
        self.options.iter().find(|option| option.id == id)
    }

    /// First option flagged correct, if any.
    #[must_use]
    pub fn correct_option(&self) -> Option<&ChallengeOption> {
        self.options.iter().find(|option| option.correct)
    }

    #[must_use]
    pub fn grading_rule(&self) -> GradingRule {
        self.kind.grading_rule()
    }

    /// Options sorted by their canonical `order`; options without one sort last.
    #[must_use]
    pub fn options_in_order(&self) -> Vec<&ChallengeOption> {
        let mut sorted: Vec<_> = self.options.iter().collect();
        sorted.sort_by_key(|option| (option.order.is_none(), option.order, option.id));
        sorted
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
