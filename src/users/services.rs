use jiff::tz::TimeZone;
use thiserror::Error;

/// Values applied to profiles that have not configured their own.
#[derive(Debug, Clone)]
pub struct ProfileDefaults {
    pub timezone: String,
    pub calorie_target: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("unknown timezone {0:?}")]
    InvalidTimezone(String),
    #[error("calorie target must be a positive number of kcal, got {0}")]
    InvalidTarget(i64),
    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

/// Resolves an IANA identifier. Lookup is case-insensitive.
pub fn parse_timezone(name: &str) -> Result<TimeZone, ProfileError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ProfileError::InvalidTimezone(name.to_string()));
    }
    TimeZone::get(name).map_err(|_| ProfileError::InvalidTimezone(name.to_string()))
}

/// Name to persist for a zone: the canonical IANA spelling when known.
pub fn canonical_name(zone: &TimeZone, requested: &str) -> String {
    zone.iana_name()
        .map_or_else(|| requested.trim().to_string(), str::to_string)
}

pub fn validate_target(target: i64) -> Result<i64, ProfileError> {
    if target > 0 {
        Ok(target)
    } else {
        Err(ProfileError::InvalidTarget(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_iana_zones() {
        assert!(parse_timezone("Europe/Moscow").is_ok());
        assert!(parse_timezone("  America/Los_Angeles ").is_ok());
        assert!(parse_timezone("UTC").is_ok());
    }

    #[test]
    fn rejects_unknown_zones() {
        for bad in ["", "   ", "Moscow", "Europe/Atlantis", "GMT+25"] {
            assert!(
                matches!(parse_timezone(bad), Err(ProfileError::InvalidTimezone(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn canonical_name_prefers_the_database_spelling() {
        let zone = parse_timezone("europe/berlin").unwrap();
        assert_eq!(canonical_name(&zone, "europe/berlin"), "Europe/Berlin");
    }

    #[test]
    fn targets_must_be_positive() {
        assert_eq!(validate_target(2000).unwrap(), 2000);
        assert!(matches!(validate_target(0), Err(ProfileError::InvalidTarget(0))));
        assert!(matches!(validate_target(-5), Err(ProfileError::InvalidTarget(-5))));
    }
}
