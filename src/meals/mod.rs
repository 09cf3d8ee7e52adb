mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod validator;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::meal_routes()
}
