mod app;
mod chat;
mod config;
mod ingest;
mod ledger;
mod meals;
mod memory;
mod recognition;
mod state;
mod users;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "caloriebot=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        default_timezone = %config.default_timezone,
        default_target = ?config.default_calorie_target,
        persistent = config.database_url.is_some(),
        "config loaded"
    );

    let state = AppState::init(&config).await?;
    let app = app::build_app(state);
    app::serve(app, &config.host, config.port).await
}
