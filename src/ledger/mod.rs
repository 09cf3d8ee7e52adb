pub mod day;

use std::sync::Arc;

use dashmap::DashMap;
use jiff::civil::Date;
use jiff::tz::TimeZone;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};

use crate::meals::repo::MealStore;
use crate::meals::repo_types::{MealRecord, NewMeal};
use crate::meals::validator::ValidatedMeal;
use crate::users::repo::UserProfileStore;
use crate::users::repo_types::{UserId, UserProfile};
use crate::users::services::{
    canonical_name, parse_timezone, validate_target, ProfileDefaults, ProfileError,
};

use self::day::CalendarError;

/// Calorie balance for one user on one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySummary {
    pub user_id: UserId,
    pub day_key: Date,
    pub timezone: String,
    pub calorie_target: Option<i64>,
    pub consumed_calories: i64,
    /// Negative when over budget. `None` while no target is known.
    pub remaining_calories: Option<i64>,
    pub meal_count: usize,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// One async mutex per user. Different users never contend.
///
/// A slot lives only while someone holds or waits on it.
#[derive(Default)]
struct UserLocks {
    slots: DashMap<UserId, Arc<Mutex<()>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: UserId) -> UserGuard<'_> {
        let slot = self.slots.entry(user_id).or_default().clone();
        UserGuard {
            locks: self,
            user_id,
            _held: slot.lock_owned().await,
        }
    }
}

struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: UserId,
    _held: OwnedMutexGuard<()>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        // Two references left: the map's and the one inside `_held`.
        self.locks
            .slots
            .remove_if(&self.user_id, |_, slot| Arc::strong_count(slot) == 2);
    }
}

/// Daily aggregation over the meal log, evaluated in each user's current timezone.
///
/// Day membership is always recomputed from the profile's timezone at query
/// time, so changing the timezone moves past meals between days.
pub struct CalorieLedger {
    profiles: Arc<dyn UserProfileStore>,
    meals: Arc<dyn MealStore>,
    defaults: ProfileDefaults,
    default_zone: TimeZone,
    locks: UserLocks,
}

impl CalorieLedger {
    pub fn new(
        profiles: Arc<dyn UserProfileStore>,
        meals: Arc<dyn MealStore>,
        defaults: ProfileDefaults,
    ) -> Result<Self, ProfileError> {
        let default_zone = parse_timezone(&defaults.timezone)?;
        Ok(Self {
            profiles,
            meals,
            defaults,
            default_zone,
            locks: UserLocks::default(),
        })
    }

    /// Appends a meal stamped with `now_utc`.
    #[instrument(skip(self, meal), fields(calories = meal.calories))]
    pub async fn record_meal(
        &self,
        user_id: UserId,
        meal: ValidatedMeal,
        now_utc: OffsetDateTime,
    ) -> Result<MealRecord, LedgerError> {
        let _guard = self.locks.acquire(user_id).await;
        self.append(user_id, meal, now_utc).await
    }

    /// Appends a meal and computes the summary that includes it, under one lock.
    #[instrument(skip(self, meal), fields(calories = meal.calories))]
    pub async fn record_meal_with_summary(
        &self,
        user_id: UserId,
        meal: ValidatedMeal,
        now_utc: OffsetDateTime,
    ) -> Result<(MealRecord, DailySummary), LedgerError> {
        let _guard = self.locks.acquire(user_id).await;
        let record = self.append(user_id, meal, now_utc).await?;
        let summary = self.summarize(user_id, now_utc).await?;
        Ok((record, summary))
    }

    #[instrument(skip(self))]
    pub async fn daily_summary(
        &self,
        user_id: UserId,
        now_utc: OffsetDateTime,
    ) -> Result<DailySummary, LedgerError> {
        let _guard = self.locks.acquire(user_id).await;
        self.summarize(user_id, now_utc).await
    }

    pub async fn profile(&self, user_id: UserId) -> Result<UserProfile, LedgerError> {
        let _guard = self.locks.acquire(user_id).await;
        Ok(self
            .profiles
            .get_or_create(user_id, &self.defaults.timezone)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn set_target(&self, user_id: UserId, target: i64) -> Result<UserProfile, ProfileError> {
        let target = validate_target(target)?;
        let _guard = self.locks.acquire(user_id).await;
        let profile = self
            .profiles
            .set_calorie_target(user_id, target, &self.defaults.timezone)
            .await?;
        info!(user_id, target, "calorie target updated");
        Ok(profile)
    }

    /// Rejects unknown zones before touching the store, leaving the old value intact.
    #[instrument(skip(self))]
    pub async fn set_timezone(&self, user_id: UserId, timezone: &str) -> Result<UserProfile, ProfileError> {
        let zone = parse_timezone(timezone)?;
        let name = canonical_name(&zone, timezone);
        let _guard = self.locks.acquire(user_id).await;
        let profile = self.profiles.set_timezone(user_id, &name).await?;
        info!(user_id, timezone = %name, "timezone updated");
        Ok(profile)
    }

    pub async fn history(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MealRecord>, LedgerError> {
        Ok(self.meals.list_recent(user_id, limit, offset).await?)
    }

    async fn append(
        &self,
        user_id: UserId,
        meal: ValidatedMeal,
        now_utc: OffsetDateTime,
    ) -> Result<MealRecord, LedgerError> {
        self.profiles
            .get_or_create(user_id, &self.defaults.timezone)
            .await?;
        let record = self
            .meals
            .append(NewMeal {
                user_id,
                dish: meal.dish,
                portion: meal.portion,
                calories: meal.calories,
                low_confidence: meal.low_confidence,
                raw_estimate: meal.raw_estimate,
                created_at_utc: now_utc,
            })
            .await?;
        info!(user_id, meal_id = record.id, calories = record.calories, "meal recorded");
        Ok(record)
    }

    async fn summarize(
        &self,
        user_id: UserId,
        now_utc: OffsetDateTime,
    ) -> Result<DailySummary, LedgerError> {
        let profile = self
            .profiles
            .get_or_create(user_id, &self.defaults.timezone)
            .await?;
        let (zone, timezone) = self.zone_for(&profile);
        let window = day::day_window(now_utc, &zone)?;
        let meals = self
            .meals
            .list_between(user_id, window.start_utc, window.end_utc)
            .await?;

        let consumed = meals
            .iter()
            .fold(0i64, |acc, m| acc.saturating_add(m.calories));
        let target = profile.calorie_target.or(self.defaults.calorie_target);

        Ok(DailySummary {
            user_id,
            day_key: window.day_key,
            timezone,
            calorie_target: target,
            consumed_calories: consumed,
            remaining_calories: target.map(|t| t.saturating_sub(consumed)),
            meal_count: meals.len(),
        })
    }

    /// The zone to bucket days in, with the name to report for it.
    fn zone_for(&self, profile: &UserProfile) -> (TimeZone, String) {
        match parse_timezone(&profile.timezone) {
            Ok(zone) => (zone, profile.timezone.clone()),
            Err(_) => {
                warn!(
                    user_id = profile.telegram_id,
                    timezone = %profile.timezone,
                    fallback = %self.defaults.timezone,
                    "stored timezone no longer resolves; using the default"
                );
                (self.default_zone.clone(), self.defaults.timezone.clone())
            }
        }
    }
}
