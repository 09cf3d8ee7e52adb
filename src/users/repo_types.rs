use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Chat-platform identity of a user.
pub type UserId = i64;

/// Per-user settings row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub telegram_id: UserId,           // chat platform user id
    pub calorie_target: Option<i64>,   // daily kcal budget, unset until configured
    pub timezone: String,              // IANA zone name
}
