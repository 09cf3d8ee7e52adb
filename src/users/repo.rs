use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use super::repo_types::{UserId, UserProfile};

#[async_trait]
pub trait UserProfileStore: Send + Sync {
    /// Loads a profile, creating it with `default_timezone` on first contact.
    async fn get_or_create(
        &self,
        user_id: UserId,
        default_timezone: &str,
    ) -> anyhow::Result<UserProfile>;

    async fn set_calorie_target(
        &self,
        user_id: UserId,
        target: i64,
        default_timezone: &str,
    ) -> anyhow::Result<UserProfile>;

    async fn set_timezone(&self, user_id: UserId, timezone: &str) -> anyhow::Result<UserProfile>;
}

#[derive(Clone)]
pub struct PgUserProfileStore {
    db: PgPool,
}

impl PgUserProfileStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserProfileStore for PgUserProfileStore {
    async fn get_or_create(
        &self,
        user_id: UserId,
        default_timezone: &str,
    ) -> anyhow::Result<UserProfile> {
        sqlx::query(
            r#"
            INSERT INTO users (telegram_id, timezone)
            VALUES ($1, $2)
            ON CONFLICT (telegram_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(default_timezone)
        .execute(&self.db)
        .await
        .context("insert default user")?;

        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT telegram_id, calorie_target, timezone
              FROM users
             WHERE telegram_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await
        .context("load user")?;

        Ok(profile)
    }

    async fn set_calorie_target(
        &self,
        user_id: UserId,
        target: i64,
        default_timezone: &str,
    ) -> anyhow::Result<UserProfile> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO users (telegram_id, calorie_target, timezone)
            VALUES ($1, $2, $3)
            ON CONFLICT (telegram_id) DO UPDATE SET calorie_target = EXCLUDED.calorie_target
            RETURNING telegram_id, calorie_target, timezone
            "#,
        )
        .bind(user_id)
        .bind(target)
        .bind(default_timezone)
        .fetch_one(&self.db)
        .await
        .context("update calorie target")?;

        Ok(profile)
    }

    async fn set_timezone(&self, user_id: UserId, timezone: &str) -> anyhow::Result<UserProfile> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO users (telegram_id, timezone)
            VALUES ($1, $2)
            ON CONFLICT (telegram_id) DO UPDATE SET timezone = EXCLUDED.timezone
            RETURNING telegram_id, calorie_target, timezone
            "#,
        )
        .bind(user_id)
        .bind(timezone)
        .fetch_one(&self.db)
        .await
        .context("update timezone")?;

        Ok(profile)
    }
}
