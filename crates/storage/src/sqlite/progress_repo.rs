use async_trait::async_trait;
use chrono::Utc;
use quiz_core::model::{ChallengeId, LearnerId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, learner_i64};
use crate::repository::{ChallengeProgressRepository, StorageError};

#[async_trait]
impl ChallengeProgressRepository for SqliteRepository {
    async fn mark_completed(
        &self,
        learner: LearnerId,
        challenge: ChallengeId,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO challenge_progress (learner_id, challenge_id, completed_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(learner_id, challenge_id) DO NOTHING
            ",
        )
        .bind(learner_i64(learner)?)
        .bind(id_i64("challenge_id", challenge.value())?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| {
            let unknown_challenge = matches!(
                &err,
                sqlx::Error::Database(db) if db.is_foreign_key_violation()
            );
            if unknown_challenge {
                StorageError::NotFound
            } else {
                conn(err)
            }
        })?;
        Ok(())
    }
}
