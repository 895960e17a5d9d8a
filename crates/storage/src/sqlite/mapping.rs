use quiz_core::model::{ChallengeId, ChallengeKind, LearnerId, LessonId, OptionId};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn challenge_id_from_i64(v: i64) -> Result<ChallengeId, StorageError> {
    Ok(ChallengeId::new(i64_to_u64("challenge_id", v)?))
}

pub(crate) fn option_id_from_i64(v: i64) -> Result<OptionId, StorageError> {
    Ok(OptionId::new(i64_to_u64("option_id", v)?))
}

pub(crate) fn learner_i64(learner: LearnerId) -> Result<i64, StorageError> {
    id_i64("learner_id", learner.value())
}

pub(crate) fn parse_challenge_kind(s: &str) -> Result<ChallengeKind, StorageError> {
    ChallengeKind::from_name(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid challenge kind: {s}")))
}
