mod openai;
mod stub;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderConfig;

pub use openai::OpenAiProvider;
pub use stub::StubProvider;

/// What a provider believes is on the plate, before any validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEstimate {
    pub dish_name: String,
    pub calories: Option<f64>,
    pub confidence: Option<f64>,
    pub portion: Option<String>,
    pub health_score: Option<f64>,
    pub recommendation: Option<String>,
    pub motivation: Option<String>,
    /// The provider's reply exactly as it parsed, kept for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_json: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Network trouble, timeouts, rate limits. Worth one more try.
    #[error("recognition temporarily unavailable: {0}")]
    Transient(String),
    #[error("image cannot be recognised: {0}")]
    InvalidImage(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    /// The vendor refused for reasons unrelated to the image (credentials, quota, model).
    #[error("provider rejected the request: {0}")]
    Rejected(String),
}

impl RecognitionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Turns image bytes into a meal estimate. Implementations hold no mutable
/// state and are shared across concurrent ingestions.
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<RawEstimate, RecognitionError>;

    fn name(&self) -> &'static str;
}

pub fn build_provider(config: &ProviderConfig) -> anyhow::Result<Arc<dyn RecognitionProvider>> {
    let provider: Arc<dyn RecognitionProvider> = match config {
        ProviderConfig::OpenAi {
            api_key,
            model,
            base_url,
            timeout,
        } => Arc::new(OpenAiProvider::new(
            api_key.clone(),
            model.clone(),
            base_url.clone(),
            *timeout,
        )?),
        ProviderConfig::Stub { dish, calories } => {
            Arc::new(StubProvider::new(dish.clone(), *calories))
        }
    };
    tracing::info!(provider = provider.name(), "recognition provider ready");
    Ok(provider)
}

/// Detects the image format from its magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), Some("image/jpeg"));
        assert_eq!(
            sniff_mime(b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR"),
            Some("image/png")
        );
        assert_eq!(sniff_mime(b"GIF89a...."), Some("image/gif"));
        assert_eq!(sniff_mime(b"RIFF\x24\x00\x00\x00WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_mime(b"RIFF\x24\x00\x00\x00WAVEfmt "), None);
        assert_eq!(sniff_mime(b"%PDF-1.7"), None);
        assert_eq!(sniff_mime(&[]), None);
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(RecognitionError::Transient("503".into()).is_transient());
        assert!(!RecognitionError::InvalidImage("blurry".into()).is_transient());
        assert!(!RecognitionError::MalformedResponse("{".into()).is_transient());
        assert!(!RecognitionError::Rejected("401".into()).is_transient());
    }

    #[test]
    fn builds_the_configured_provider() {
        let stub = build_provider(&ProviderConfig::Stub {
            dish: "soup".into(),
            calories: Some(200.0),
        })
        .unwrap();
        assert_eq!(stub.name(), "stub");

        let openai = build_provider(&ProviderConfig::OpenAi {
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
            base_url: "http://localhost:9".into(),
            timeout: std::time::Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(openai.name(), "openai");
    }
}
