use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::ledger::{CalorieLedger, DailySummary, LedgerError};
use crate::meals::repo_types::MealRecord;
use crate::meals::validator::{self, ValidationError};
use crate::recognition::{RawEstimate, RecognitionError, RecognitionProvider};
use crate::users::repo_types::UserId;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("recognition provider unavailable: {0}")]
    TransientFailure(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("provider rejected the request: {0}")]
    ProviderRejected(String),
    #[error("estimate failed validation: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<RecognitionError> for IngestionError {
    fn from(e: RecognitionError) -> Self {
        match e {
            RecognitionError::Transient(m) => Self::TransientFailure(m),
            RecognitionError::InvalidImage(m) => Self::InvalidImage(m),
            RecognitionError::MalformedResponse(m) => Self::MalformedResponse(m),
            RecognitionError::Rejected(m) => Self::ProviderRejected(m),
        }
    }
}

/// Provider commentary that is shown to the user but not used for accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EstimateNotes {
    pub health_score: Option<f64>,
    pub recommendation: Option<String>,
    pub motivation: Option<String>,
}

impl From<&RawEstimate> for EstimateNotes {
    fn from(raw: &RawEstimate) -> Self {
        Self {
            health_score: raw.health_score,
            recommendation: raw.recommendation.clone(),
            motivation: raw.motivation.clone(),
        }
    }
}

/// Result of one successful ingestion. `summary` already includes `meal`.
#[derive(Debug, Clone, Serialize)]
pub struct Ingested {
    pub meal: MealRecord,
    pub summary: DailySummary,
    pub notes: EstimateNotes,
}

/// Photo in, recorded meal and fresh daily summary out.
///
/// Persistence is the final step, so dropping the future before it completes
/// leaves no trace in the meal log.
pub struct IngestionPipeline {
    provider: Arc<dyn RecognitionProvider>,
    ledger: Arc<CalorieLedger>,
    retry_delay: Duration,
}

impl IngestionPipeline {
    pub fn new(
        provider: Arc<dyn RecognitionProvider>,
        ledger: Arc<CalorieLedger>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            provider,
            ledger,
            retry_delay,
        }
    }

    #[instrument(
        skip(self, image),
        fields(ingest_id = %Uuid::new_v4(), bytes = image.len(), provider = self.provider.name())
    )]
    pub async fn ingest(
        &self,
        user_id: UserId,
        image: &[u8],
        now_utc: OffsetDateTime,
    ) -> Result<Ingested, IngestionError> {
        let raw = self.recognize(image).await.map_err(|e| {
            warn!(error = %e, "recognition failed");
            IngestionError::from(e)
        })?;

        let meal = validator::validate(&raw)?;
        if meal.low_confidence {
            info!(dish = %meal.dish, "provider gave no calorie figure; recording 0 kcal");
        }

        let notes = EstimateNotes::from(&raw);
        let (meal, summary) = self
            .ledger
            .record_meal_with_summary(user_id, meal, now_utc)
            .await?;
        Ok(Ingested {
            meal,
            summary,
            notes,
        })
    }

    /// Calls the provider, retrying once after a fixed delay on transient failure.
    async fn recognize(&self, image: &[u8]) -> Result<RawEstimate, RecognitionError> {
        match self.provider.recognize(image).await {
            Err(e) if e.is_transient() => {
                warn!(
                    error = %e,
                    delay_ms = self.retry_delay.as_millis() as u64,
                    "transient recognition failure, retrying once"
                );
                tokio::time::sleep(self.retry_delay).await;
                self.provider.recognize(image).await
            }
            other => other,
        }
    }
}
