use async_trait::async_trait;
use chrono::Utc;
use quiz_core::model::{LearnerId, Subscription};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, learner_i64, ser};
use crate::repository::{StorageError, SubscriptionRepository};

#[async_trait]
impl SubscriptionRepository for SqliteRepository {
    async fn subscription(&self, learner: LearnerId) -> Result<Subscription, StorageError> {
        let row = sqlx::query("SELECT active FROM subscriptions WHERE learner_id = ?1")
            .bind(learner_i64(learner)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(Subscription::inactive());
        };
        let active: i64 = row.try_get("active").map_err(ser)?;
        Ok(Subscription {
            is_active: active != 0,
        })
    }

    async fn set_subscription(
        &self,
        learner: LearnerId,
        subscription: Subscription,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO subscriptions (learner_id, active, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(learner_id) DO UPDATE SET
                    active = excluded.active,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(learner_i64(learner)?)
        .bind(subscription.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
