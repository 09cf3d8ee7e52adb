use crate::ingest::Ingested;
use crate::ledger::DailySummary;
use crate::users::repo_types::UserProfile;

const DASH: &str = "—";

pub const GREETING: &str = "Hi! I help you track what you eat from photos.\n\
Set your daily calorie target: /target 2000\n\
Change your timezone: /timezone Europe/Moscow\n\
Check today's balance: /status\n\n\
Then just send me a photo of your meal.";

pub const ASK_TARGET: &str = "How many kilocalories per day? Send a whole number, e.g. 2000.";
pub const INVALID_TARGET: &str = "Please send a positive whole number of kilocalories, e.g. 2000.";
pub const TIMEZONE_USAGE: &str = "Usage: /timezone <IANA zone>, e.g. /timezone Europe/Moscow";
pub const TARGET_REQUIRED: &str = "Set your daily calorie target first: /target <kcal>.";
pub const SEND_PHOTO: &str = "Send me a photo of your meal, or /status for today's balance.";
pub const RESHOOT: &str =
    "I can't make out the meal on this photo. Please retake it in better light and send it again.";
pub const BUSY: &str = "The recognition service is busy right now. Please send the photo again in a minute.";
pub const ANALYSIS_FAILED: &str = "I couldn't analyse this photo. Please try again.";

pub fn unknown_timezone(tz: &str) -> String {
    format!("Unknown timezone {tz:?}. Examples: Europe/Moscow, Europe/Berlin, Asia/Almaty.")
}

pub fn unknown_command(name: &str) -> String {
    format!("Unknown command /{name}. {SEND_PHOTO}")
}

pub fn target_set(profile: &UserProfile) -> String {
    match profile.calorie_target {
        Some(target) => format!("Daily target set: {target} kcal"),
        None => TARGET_REQUIRED.to_string(),
    }
}

pub fn timezone_set(profile: &UserProfile) -> String {
    format!("Timezone updated: {}", profile.timezone)
}

pub fn status(summary: &DailySummary) -> String {
    let Some(target) = summary.calorie_target else {
        return TARGET_REQUIRED.to_string();
    };
    format!(
        "Daily target: {target} kcal\n\
         Eaten today ({}): {} kcal\n\
         Remaining today: {}\n\
         Timezone: {}",
        summary.day_key,
        summary.consumed_calories,
        kcal(summary.remaining_calories),
        summary.timezone,
    )
}

/// Reply card for a freshly recorded meal.
pub fn meal_card(ingested: &Ingested) -> String {
    let meal = &ingested.meal;
    let notes = &ingested.notes;
    let calories = if meal.low_confidence {
        format!("{DASH} (could not estimate)")
    } else {
        format!("{} kcal", meal.calories)
    };
    let health = notes
        .health_score
        .map_or_else(|| DASH.to_string(), |s| format!("{s}"));

    [
        format!("🍽️ Dish: {}", meal.dish),
        format!("📏 Portion: {}", meal.portion.as_deref().unwrap_or(DASH)),
        format!("🔥 Calories: {calories}"),
        format!("✅ Health score: {health}"),
        format!("💡 Tip: {}", notes.recommendation.as_deref().unwrap_or(DASH)),
        format!("📉 Remaining today: {}", kcal(ingested.summary.remaining_calories)),
        format!("💬 {}", notes.motivation.as_deref().unwrap_or("Great job!")),
    ]
    .join("\n")
}

fn kcal(value: Option<i64>) -> String {
    value.map_or_else(|| DASH.to_string(), |v| format!("{v} kcal"))
}
