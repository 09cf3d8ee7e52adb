use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::chat::ChatRouter;
use crate::config::AppConfig;
use crate::ingest::IngestionPipeline;
use crate::ledger::CalorieLedger;
use crate::meals::repo::{MealStore, PgMealStore};
use crate::memory::MemoryStore;
use crate::recognition::{build_provider, RecognitionProvider};
use crate::users::repo::{PgUserProfileStore, UserProfileStore};
use crate::users::services::ProfileDefaults;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<CalorieLedger>,
    pub pipeline: Arc<IngestionPipeline>,
    pub chat: Arc<ChatRouter>,
}

impl AppState {
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let (profiles, meals): (Arc<dyn UserProfileStore>, Arc<dyn MealStore>) =
            match &config.database_url {
                Some(url) => {
                    let db = PgPoolOptions::new()
                        .max_connections(10)
                        .connect(url)
                        .await
                        .context("connect to database")?;
                    sqlx::migrate!("./migrations")
                        .run(&db)
                        .await
                        .context("run migrations")?;
                    (
                        Arc::new(PgUserProfileStore::new(db.clone())),
                        Arc::new(PgMealStore::new(db)),
                    )
                }
                None => {
                    tracing::warn!("DATABASE_URL is not set; meals are kept in memory only");
                    let store = Arc::new(MemoryStore::default());
                    (store.clone(), store)
                }
            };

        let provider = build_provider(&config.provider)?;
        Self::from_parts(config, profiles, meals, provider)
    }

    pub fn from_parts(
        config: &AppConfig,
        profiles: Arc<dyn UserProfileStore>,
        meals: Arc<dyn MealStore>,
        provider: Arc<dyn RecognitionProvider>,
    ) -> anyhow::Result<Self> {
        let defaults = ProfileDefaults {
            timezone: config.default_timezone.clone(),
            calorie_target: config.default_calorie_target,
        };
        let ledger = Arc::new(CalorieLedger::new(profiles, meals, defaults)?);
        let pipeline = Arc::new(IngestionPipeline::new(
            provider,
            ledger.clone(),
            config.retry_delay,
        ));
        let chat = Arc::new(ChatRouter::new(ledger.clone(), pipeline.clone()));
        Ok(Self {
            ledger,
            pipeline,
            chat,
        })
    }
}
