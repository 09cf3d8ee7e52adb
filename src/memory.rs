use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::meals::repo::MealStore;
use crate::meals::repo_types::{MealRecord, NewMeal};
use crate::users::repo::UserProfileStore;
use crate::users::repo_types::{UserId, UserProfile};

/// Process-local store for both profiles and meals. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<UserId, UserProfile>>,
    meals: Mutex<MealLog>,
}

#[derive(Default)]
struct MealLog {
    rows: Vec<MealRecord>,
    last_id: i64,
}

fn new_profile(user_id: UserId, timezone: &str) -> UserProfile {
    UserProfile {
        telegram_id: user_id,
        calorie_target: None,
        timezone: timezone.to_string(),
    }
}

#[async_trait]
impl UserProfileStore for MemoryStore {
    async fn get_or_create(
        &self,
        user_id: UserId,
        default_timezone: &str,
    ) -> anyhow::Result<UserProfile> {
        let mut users = self.users.lock().await;
        let profile = users
            .entry(user_id)
            .or_insert_with(|| new_profile(user_id, default_timezone));
        Ok(profile.clone())
    }

    async fn set_calorie_target(
        &self,
        user_id: UserId,
        target: i64,
        default_timezone: &str,
    ) -> anyhow::Result<UserProfile> {
        let mut users = self.users.lock().await;
        let profile = users
            .entry(user_id)
            .or_insert_with(|| new_profile(user_id, default_timezone));
        profile.calorie_target = Some(target);
        Ok(profile.clone())
    }

    async fn set_timezone(&self, user_id: UserId, timezone: &str) -> anyhow::Result<UserProfile> {
        let mut users = self.users.lock().await;
        let profile = users
            .entry(user_id)
            .or_insert_with(|| new_profile(user_id, timezone));
        profile.timezone = timezone.to_string();
        Ok(profile.clone())
    }
}

#[async_trait]
impl MealStore for MemoryStore {
    async fn append(&self, meal: NewMeal) -> anyhow::Result<MealRecord> {
        if !self.users.lock().await.contains_key(&meal.user_id) {
            anyhow::bail!("meal references unknown user {}", meal.user_id);
        }
        let mut log = self.meals.lock().await;
        log.last_id += 1;
        let record = MealRecord {
            id: log.last_id,
            user_id: meal.user_id,
            dish: meal.dish,
            portion: meal.portion,
            calories: meal.calories,
            low_confidence: meal.low_confidence,
            raw_estimate: meal.raw_estimate,
            created_at_utc: meal.created_at_utc,
        };
        log.rows.push(record.clone());
        Ok(record)
    }

    async fn list_between(
        &self,
        user_id: UserId,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> anyhow::Result<Vec<MealRecord>> {
        let log = self.meals.lock().await;
        let mut rows: Vec<MealRecord> = log
            .rows
            .iter()
            .filter(|m| m.user_id == user_id && m.created_at_utc >= from && m.created_at_utc < to)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.created_at_utc, m.id));
        Ok(rows)
    }

    async fn list_recent(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<MealRecord>> {
        let log = self.meals.lock().await;
        let mut rows: Vec<MealRecord> = log
            .rows
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| std::cmp::Reverse((m.created_at_utc, m.id)));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

/// Serves reads from an in-memory log but refuses every append.
#[cfg(test)]
pub struct ReadOnlyMeals(pub std::sync::Arc<MemoryStore>);

#[cfg(test)]
#[async_trait]
impl MealStore for ReadOnlyMeals {
    async fn append(&self, _meal: NewMeal) -> anyhow::Result<MealRecord> {
        anyhow::bail!("meal log is read-only")
    }

    async fn list_between(
        &self,
        user_id: UserId,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> anyhow::Result<Vec<MealRecord>> {
        self.0.list_between(user_id, from, to).await
    }

    async fn list_recent(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<MealRecord>> {
        self.0.list_recent(user_id, limit, offset).await
    }
}
