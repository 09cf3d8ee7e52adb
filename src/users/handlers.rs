use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, instrument, warn};

use super::dto::{PutTargetRequest, PutTimezoneRequest};
use super::repo_types::{UserId, UserProfile};
use super::services::ProfileError;
use crate::ledger::DailySummary;
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/summary", get(get_summary))
        .route("/users/:user_id/target", put(put_target))
        .route("/users/:user_id/timezone", put(put_timezone))
}

#[instrument(skip(state))]
pub async fn get_summary(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<DailySummary>, (StatusCode, String)> {
    let summary = state
        .ledger
        .daily_summary(user_id, OffsetDateTime::now_utc())
        .await
        .map_err(|e| {
            error!(error = %e, user_id, "daily summary failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    Ok(Json(summary))
}

#[instrument(skip(state, body))]
pub async fn put_target(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(body): Json<PutTargetRequest>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    let profile = state
        .ledger
        .set_target(user_id, body.calories)
        .await
        .map_err(profile_error)?;
    Ok(Json(profile))
}

#[instrument(skip(state, body))]
pub async fn put_timezone(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(body): Json<PutTimezoneRequest>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    let profile = state
        .ledger
        .set_timezone(user_id, &body.timezone)
        .await
        .map_err(profile_error)?;
    Ok(Json(profile))
}

fn profile_error(e: ProfileError) -> (StatusCode, String) {
    match e {
        ProfileError::InvalidTimezone(_) | ProfileError::InvalidTarget(_) => {
            warn!(error = %e, "profile update rejected");
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        ProfileError::Persistence(_) => {
            error!(error = %e, "profile update failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
