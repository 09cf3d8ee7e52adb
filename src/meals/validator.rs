use thiserror::Error;

use crate::recognition::RawEstimate;

/// Shown instead of a blank dish name.
pub const UNKNOWN_DISH: &str = "unknown dish";

/// Normalised fields of a meal ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMeal {
    pub dish: String,
    pub portion: Option<String>,
    pub calories: i64,
    pub low_confidence: bool,
    pub raw_estimate: Option<serde_json::Value>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("calorie estimate is not a finite number: {0}")]
    NotFinite(f64),
    #[error("calorie estimate {0} is out of range")]
    OutOfRange(f64),
}

/// Normalises a provider estimate.
///
/// Missing calories become `0` and flag the meal as low confidence. Values are
/// rounded to the nearest integer and negatives clamp to `0`. There is no upper
/// ceiling: whatever the provider says is recorded.
pub fn validate(raw: &RawEstimate) -> Result<ValidatedMeal, ValidationError> {
    let (calories, low_confidence) = match raw.calories {
        None => (0, true),
        Some(value) => (round_calories(value)?, false),
    };

    let dish = match raw.dish_name.trim() {
        "" => UNKNOWN_DISH.to_string(),
        name => name.to_string(),
    };
    let portion = raw
        .portion
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    Ok(ValidatedMeal {
        dish,
        portion,
        calories,
        low_confidence,
        raw_estimate: raw
            .raw_json
            .clone()
            .or_else(|| serde_json::to_value(raw).ok()),
    })
}

fn round_calories(value: f64) -> Result<i64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite(value));
    }
    let rounded = value.round();
    if rounded <= 0.0 {
        return Ok(0);
    }
    // i64::MAX is not representable; 2^63 is the first float past it.
    if rounded >= i64::MAX as f64 {
        return Err(ValidationError::OutOfRange(value));
    }
    Ok(rounded as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(dish: &str, calories: Option<f64>) -> RawEstimate {
        RawEstimate {
            dish_name: dish.into(),
            calories,
            ..RawEstimate::default()
        }
    }

    #[test]
    fn non_negative_calories_round_to_nearest() {
        for (input, expected) in [
            (0.0, 0),
            (0.4, 0),
            (0.5, 1),
            (249.49, 249),
            (649.5, 650),
            (700.0, 700),
            (1234.999, 1235),
        ] {
            let meal = validate(&estimate("soup", Some(input))).unwrap();
            assert_eq!(meal.calories, expected, "input {input}");
            assert!(!meal.low_confidence);
        }
    }

    #[test]
    fn negative_calories_clamp_to_zero() {
        for input in [-0.3, -0.5, -1.0, -950.7] {
            assert_eq!(validate(&estimate("soup", Some(input))).unwrap().calories, 0);
        }
    }

    #[test]
    fn missing_calories_are_recorded_as_zero_with_low_confidence() {
        let meal = validate(&estimate("mystery stew", None)).unwrap();
        assert_eq!(meal.calories, 0);
        assert!(meal.low_confidence);
        assert_eq!(meal.dish, "mystery stew");
    }

    #[test]
    fn absurd_values_pass_through() {
        assert_eq!(validate(&estimate("feast", Some(50_000.0))).unwrap().calories, 50_000);
    }

    #[test]
    fn non_finite_and_unrepresentable_values_are_rejected() {
        assert!(matches!(
            validate(&estimate("x", Some(f64::NAN))),
            Err(ValidationError::NotFinite(_))
        ));
        assert!(matches!(
            validate(&estimate("x", Some(f64::INFINITY))),
            Err(ValidationError::NotFinite(_))
        ));
        assert!(matches!(
            validate(&estimate("x", Some(1e19))),
            Err(ValidationError::OutOfRange(_))
        ));
    }

    #[test]
    fn blank_dish_names_get_a_placeholder() {
        assert_eq!(validate(&estimate("", Some(1.0))).unwrap().dish, UNKNOWN_DISH);
        assert_eq!(validate(&estimate(" \t\n", Some(1.0))).unwrap().dish, UNKNOWN_DISH);
        assert_eq!(validate(&estimate("  Pho bo ", Some(1.0))).unwrap().dish, "Pho bo");
    }

    #[test]
    fn portion_is_trimmed_and_raw_estimate_kept() {
        let raw = RawEstimate {
            dish_name: "pasta".into(),
            calories: Some(540.0),
            portion: Some("  ".into()),
            recommendation: Some("more greens".into()),
            ..RawEstimate::default()
        };
        let meal = validate(&raw).unwrap();
        assert_eq!(meal.portion, None);
        let kept = meal.raw_estimate.unwrap();
        assert_eq!(kept["recommendation"], "more greens");
        assert_eq!(kept["calories"], 540.0);
    }

    #[test]
    fn provider_reply_is_stored_verbatim() {
        let reply = serde_json::json!({
            "dish": "soup",
            "calories_kcal": 300,
            "ingredients": ["beet"],
            "low_quality": false,
        });
        let raw = RawEstimate {
            dish_name: "soup".into(),
            calories: Some(300.0),
            raw_json: Some(reply.clone()),
            ..RawEstimate::default()
        };
        let kept = validate(&raw).unwrap().raw_estimate.unwrap();
        assert_eq!(kept, reply);
        assert_eq!(kept["calories_kcal"], 300);
        assert_eq!(kept["ingredients"][0], "beet");
        assert!(kept.get("dish_name").is_none());
    }
}
