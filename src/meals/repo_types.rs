use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::users::repo_types::UserId;

/// Persisted meal. Rows are never updated; corrections are new rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MealRecord {
    pub id: i64,
    pub user_id: UserId,
    pub dish: String,
    pub portion: Option<String>,
    pub calories: i64,
    pub low_confidence: bool,
    pub raw_estimate: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at_utc: OffsetDateTime,
}

/// A meal about to be appended; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewMeal {
    pub user_id: UserId,
    pub dish: String,
    pub portion: Option<String>,
    pub calories: i64,
    pub low_confidence: bool,
    pub raw_estimate: Option<serde_json::Value>,
    pub created_at_utc: OffsetDateTime,
}
