use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, instrument, warn};

use super::dto::Pagination;
use super::repo_types::MealRecord;
use crate::ingest::{IngestionError, Ingested};
use crate::state::AppState;
use crate::users::repo_types::UserId;

pub fn meal_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/meals", get(list_meals).post(ingest_photo))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<MealRecord>>, (StatusCode, String)> {
    let meals = state
        .ledger
        .history(user_id, p.limit.clamp(1, 100), p.offset.max(0))
        .await
        .map_err(|e| {
            error!(error = %e, user_id, "list meals failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    Ok(Json(meals))
}

/// POST /users/:user_id/meals with the raw image as the body.
#[instrument(skip(state, image), fields(bytes = image.len()))]
pub async fn ingest_photo(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    image: Bytes,
) -> Result<(StatusCode, Json<Ingested>), (StatusCode, String)> {
    if image.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "image body is required".into()));
    }
    let ingested = state
        .pipeline
        .ingest(user_id, &image, OffsetDateTime::now_utc())
        .await
        .map_err(ingestion_error)?;
    Ok((StatusCode::CREATED, Json(ingested)))
}

fn ingestion_error(e: IngestionError) -> (StatusCode, String) {
    let status = match &e {
        IngestionError::TransientFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        IngestionError::InvalidImage(_) | IngestionError::Validation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        IngestionError::MalformedResponse(_) | IngestionError::ProviderRejected(_) => {
            StatusCode::BAD_GATEWAY
        }
        IngestionError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %e, %status, "ingestion failed");
    } else {
        warn!(error = %e, %status, "ingestion rejected");
    }
    (status, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::RecognitionError;

    #[test]
    fn ingestion_errors_map_to_statuses() {
        let status = |e: IngestionError| ingestion_error(e).0;
        assert_eq!(
            status(RecognitionError::Transient("429".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(RecognitionError::InvalidImage("dark".into()).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(RecognitionError::MalformedResponse("{".into()).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(IngestionError::Ledger(anyhow::anyhow!("db down").into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
