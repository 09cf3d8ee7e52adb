use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_TIMEZONE: &str = "Europe/Moscow";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Which recognition vendor to talk to. Chosen once at startup.
#[derive(Clone)]
pub enum ProviderConfig {
    OpenAi {
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    },
    Stub {
        dish: String,
        calories: Option<f64>,
    },
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub default_timezone: String,
    pub default_calorie_target: Option<i64>,
    pub provider: ProviderConfig,
    pub retry_delay: Duration,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let default_timezone = var("DEFAULT_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.into());
        if jiff::tz::TimeZone::get(&default_timezone).is_err() {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_TIMEZONE",
                value: default_timezone,
            });
        }

        let default_calorie_target =
            parse_var::<i64>("DEFAULT_CALORIE_TARGET", var("DEFAULT_CALORIE_TARGET"))?;
        if let Some(target) = default_calorie_target.filter(|t| *t <= 0) {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_CALORIE_TARGET",
                value: target.to_string(),
            });
        }

        let provider = match var("RECOGNITION_PROVIDER")
            .unwrap_or_else(|| "openai".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "openai" => ProviderConfig::OpenAi {
                api_key: var("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?,
                model: var("OPENAI_VISION_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.into()),
                base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
                timeout: Duration::from_secs(
                    parse_var("RECOGNITION_TIMEOUT_SECS", var("RECOGNITION_TIMEOUT_SECS"))?
                        .unwrap_or(30),
                ),
            },
            "stub" => ProviderConfig::Stub {
                dish: var("STUB_DISH").unwrap_or_else(|| "test meal".into()),
                calories: Some(
                    parse_var::<f64>("STUB_CALORIES", var("STUB_CALORIES"))?.unwrap_or(500.0),
                ),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "RECOGNITION_PROVIDER",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            default_timezone,
            default_calorie_target,
            provider,
            retry_delay: Duration::from_millis(
                parse_var("RETRY_DELAY_MS", var("RETRY_DELAY_MS"))?.unwrap_or(500),
            ),
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_var("APP_PORT", var("APP_PORT"))?.unwrap_or(8080),
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value })
    })
    .transpose()
}
