use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use super::repo_types::{MealRecord, NewMeal};
use crate::users::repo_types::UserId;

/// Append-only meal log.
#[async_trait]
pub trait MealStore: Send + Sync {
    async fn append(&self, meal: NewMeal) -> anyhow::Result<MealRecord>;

    /// Meals with `from <= created_at_utc < to`, oldest first.
    async fn list_between(
        &self,
        user_id: UserId,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> anyhow::Result<Vec<MealRecord>>;

    /// Newest first.
    async fn list_recent(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<MealRecord>>;
}

#[derive(Clone)]
pub struct PgMealStore {
    db: PgPool,
}

impl PgMealStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MealStore for PgMealStore {
    async fn append(&self, meal: NewMeal) -> anyhow::Result<MealRecord> {
        let record = sqlx::query_as::<_, MealRecord>(
            r#"
            INSERT INTO meals (user_id, dish, portion, calories, low_confidence, raw_estimate, created_at_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, dish, portion, calories, low_confidence, raw_estimate, created_at_utc
            "#,
        )
        .bind(meal.user_id)
        .bind(meal.dish)
        .bind(meal.portion)
        .bind(meal.calories)
        .bind(meal.low_confidence)
        .bind(meal.raw_estimate)
        .bind(meal.created_at_utc)
        .fetch_one(&self.db)
        .await
        .context("insert meal")?;

        Ok(record)
    }

    async fn list_between(
        &self,
        user_id: UserId,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> anyhow::Result<Vec<MealRecord>> {
        let rows = sqlx::query_as::<_, MealRecord>(
            r#"
            SELECT id, user_id, dish, portion, calories, low_confidence, raw_estimate, created_at_utc
              FROM meals
             WHERE user_id = $1
               AND created_at_utc >= $2
               AND created_at_utc < $3
             ORDER BY created_at_utc ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await
        .context("list meals in window")?;

        Ok(rows)
    }

    async fn list_recent(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<MealRecord>> {
        let rows = sqlx::query_as::<_, MealRecord>(
            r#"
            SELECT id, user_id, dish, portion, calories, low_confidence, raw_estimate, created_at_utc
              FROM meals
             WHERE user_id = $1
             ORDER BY created_at_utc DESC, id DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list recent meals")?;

        Ok(rows)
    }
}
