use std::collections::HashMap;

use async_trait::async_trait;
use quiz_core::model::{
    Challenge, ChallengeId, ChallengeOption, ChallengeSet, LearnerId, LessonId, LessonSnapshot,
};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    challenge_id_from_i64, conn, id_i64, learner_i64, lesson_id_from_i64, option_id_from_i64,
    parse_challenge_kind, ser, u32_from_i64,
};
use crate::repository::{HeartsRepository, LessonRepository, StorageError};

fn map_challenge_row(row: &sqlx::sqlite::SqliteRow) -> Result<Challenge, StorageError> {
    let kind: String = row.try_get("kind").map_err(ser)?;
    Ok(Challenge {
        id: challenge_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        order: u32_from_i64("position", row.try_get::<i64, _>("position").map_err(ser)?)?,
        kind: parse_challenge_kind(&kind)?,
        question: row.try_get("question").map_err(ser)?,
        options: Vec::new(),
        correct_answer: row.try_get("correct_answer").map_err(ser)?,
        completed: row.try_get::<i64, _>("completed").map_err(ser)? != 0,
    })
}

fn map_option_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChallengeOption, StorageError> {
    let order = row
        .try_get::<Option<i64>, _>("position")
        .map_err(ser)?
        .map(|v| u32_from_i64("position", v))
        .transpose()?;
    Ok(ChallengeOption {
        id: option_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        challenge_id: challenge_id_from_i64(row.try_get::<i64, _>("challenge_id").map_err(ser)?)?,
        text: row.try_get("text").map_err(ser)?,
        correct: row.try_get::<i64, _>("correct").map_err(ser)? != 0,
        order,
    })
}

#[async_trait]
impl LessonRepository for SqliteRepository {
    async fn load_lesson(
        &self,
        learner: LearnerId,
        lesson: LessonId,
    ) -> Result<LessonSnapshot, StorageError> {
        let lesson_i64 = id_i64("lesson_id", lesson.value())?;

        let lesson_row = sqlx::query("SELECT id FROM lessons WHERE id = ?1")
            .bind(lesson_i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let lesson = lesson_id_from_i64(lesson_row.try_get("id").map_err(ser)?)?;

        let hearts = self.get_hearts(learner).await?;

        let challenge_rows = sqlx::query(
            r"
                SELECT
                    c.id, c.position, c.kind, c.question, c.correct_answer,
                    (p.challenge_id IS NOT NULL) AS completed
                FROM challenges c
                LEFT JOIN challenge_progress p
                    ON p.challenge_id = c.id AND p.learner_id = ?2
                WHERE c.lesson_id = ?1
                ORDER BY c.position ASC, c.id ASC
            ",
        )
        .bind(lesson_i64)
        .bind(learner_i64(learner)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let option_rows = sqlx::query(
            r"
                SELECT o.id, o.challenge_id, o.text, o.correct, o.position
                FROM challenge_options o
                JOIN challenges c ON c.id = o.challenge_id
                WHERE c.lesson_id = ?1
                ORDER BY o.challenge_id ASC, o.position ASC, o.id ASC
            ",
        )
        .bind(lesson_i64)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut options: HashMap<ChallengeId, Vec<ChallengeOption>> = HashMap::new();
        for row in &option_rows {
            let option = map_option_row(row)?;
            options.entry(option.challenge_id).or_default().push(option);
        }

        let mut challenges = Vec::with_capacity(challenge_rows.len());
        for row in &challenge_rows {
            let mut challenge = map_challenge_row(row)?;
            challenge.options = options.remove(&challenge.id).unwrap_or_default();
            challenges.push(challenge);
        }

        let set = ChallengeSet::new(lesson, challenges).map_err(ser)?;
        let percentage = LessonSnapshot::completed_percentage(&set);
        Ok(LessonSnapshot::new(set, hearts, percentage))
    }

    async fn upsert_lesson(&self, set: &ChallengeSet) -> Result<(), StorageError> {
        let lesson_i64 = id_i64("lesson_id", set.lesson_id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query("INSERT INTO lessons (id) VALUES (?1) ON CONFLICT(id) DO NOTHING")
            .bind(lesson_i64)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        // Challenges dropped from the lesson go away together with their progress.
        let keep: Vec<i64> = set
            .challenges()
            .iter()
            .map(|c| id_i64("challenge_id", c.id.value()))
            .collect::<Result<_, _>>()?;
        let existing = sqlx::query("SELECT id FROM challenges WHERE lesson_id = ?1")
            .bind(lesson_i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(conn)?;
        for row in existing {
            let id: i64 = row.try_get("id").map_err(ser)?;
            if !keep.contains(&id) {
                sqlx::query("DELETE FROM challenges WHERE id = ?1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(conn)?;
            }
        }

        // Options are rebuilt wholesale so ids may move between challenges
        // of this lesson; an id still held by another lesson is a conflict.
        sqlx::query(
            r"
                DELETE FROM challenge_options
                WHERE challenge_id IN (SELECT id FROM challenges WHERE lesson_id = ?1)
            ",
        )
        .bind(lesson_i64)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        for challenge in set.challenges() {
            let challenge_i64 = id_i64("challenge_id", challenge.id.value())?;
            let res = sqlx::query(
                r"
                    INSERT INTO challenges (id, lesson_id, position, kind, question, correct_answer)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(id) DO UPDATE SET
                        position = excluded.position,
                        kind = excluded.kind,
                        question = excluded.question,
                        correct_answer = excluded.correct_answer
                    WHERE challenges.lesson_id = excluded.lesson_id
                ",
            )
            .bind(challenge_i64)
            .bind(lesson_i64)
            .bind(i64::from(challenge.order))
            .bind(challenge.kind.as_str())
            .bind(&challenge.question)
            .bind(challenge.correct_answer.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            // the id already belongs to another lesson
            if res.rows_affected() == 0 {
                return Err(StorageError::Conflict);
            }

            for option in &challenge.options {
                sqlx::query(
                    r"
                        INSERT INTO challenge_options (id, challenge_id, text, correct, position)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                    ",
                )
                .bind(id_i64("option_id", option.id.value())?)
                .bind(challenge_i64)
                .bind(&option.text)
                .bind(option.correct)
                .bind(option.order.map(i64::from))
                .execute(&mut *tx)
                .await
                .map_err(|err| {
                    let taken = matches!(
                        &err,
                        sqlx::Error::Database(db) if db.is_unique_violation()
                    );
                    if taken { StorageError::Conflict } else { conn(err) }
                })?;
            }
        }

        tx.commit().await.map_err(conn)?;
        log::info!(
            "stored lesson {} with {} challenges",
            set.lesson_id(),
            set.len()
        );
        Ok(())
    }
}
