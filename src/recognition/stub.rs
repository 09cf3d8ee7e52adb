use async_trait::async_trait;

use super::{sniff_mime, RawEstimate, RecognitionError, RecognitionProvider};

/// Answers every photo with the same configured estimate. Used for local runs
/// without vendor credentials.
pub struct StubProvider {
    dish: String,
    calories: Option<f64>,
}

impl StubProvider {
    pub fn new(dish: String, calories: Option<f64>) -> Self {
        Self { dish, calories }
    }
}

#[async_trait]
impl RecognitionProvider for StubProvider {
    async fn recognize(&self, image: &[u8]) -> Result<RawEstimate, RecognitionError> {
        if sniff_mime(image).is_none() {
            return Err(RecognitionError::InvalidImage(
                "empty or unsupported image format".into(),
            ));
        }
        Ok(RawEstimate {
            dish_name: self.dish.clone(),
            calories: self.calories,
            confidence: Some(1.0),
            ..RawEstimate::default()
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}
