use async_trait::async_trait;
use chrono::Utc;
use quiz_core::hearts::MAX_HEARTS;
use quiz_core::model::{ChallengeId, LearnerId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, learner_i64, ser, u32_from_i64};
use crate::repository::{HeartsRepository, StorageError};

#[async_trait]
impl HeartsRepository for SqliteRepository {
    async fn init_learner(&self, learner: LearnerId, hearts: u32) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO learner_hearts (learner_id, hearts, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(learner_id) DO NOTHING
            ",
        )
        .bind(learner_i64(learner)?)
        .bind(i64::from(hearts))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_hearts(&self, learner: LearnerId) -> Result<u32, StorageError> {
        let row = sqlx::query("SELECT hearts FROM learner_hearts WHERE learner_id = ?1")
            .bind(learner_i64(learner)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        u32_from_i64("hearts", row.try_get::<i64, _>("hearts").map_err(ser)?)
    }

    async fn reduce_hearts(
        &self,
        learner: LearnerId,
        challenge: ChallengeId,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE learner_hearts
                SET hearts = MAX(hearts - 1, 0), updated_at = ?2
                WHERE learner_id = ?1
            ",
        )
        .bind(learner_i64(learner)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        log::debug!("reduced hearts of learner {learner} for challenge {challenge}");
        Ok(())
    }

    async fn refill_hearts(&self, learner: LearnerId) -> Result<u32, StorageError> {
        let res = sqlx::query(
            r"
                UPDATE learner_hearts
                SET hearts = ?2, updated_at = ?3
                WHERE learner_id = ?1
            ",
        )
        .bind(learner_i64(learner)?)
        .bind(i64::from(MAX_HEARTS))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(MAX_HEARTS)
    }
}
