use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::repo::{PgUserRepository, UserRepository};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::meals::repo::{MealRepository, PgMealRepository};
use crate::nutrition::{gemini::GeminiClient, NutritionExtractor};
use crate::storage::{S3Storage, StorageClient};
use crate::streak::repo::{PgStreakRepository, StreakRepository};

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepository>,
    pub meals: Arc<dyn MealRepository>,
    pub streaks: Arc<dyn StreakRepository>,
    pub extractor: Arc<dyn NutritionExtractor>,
    pub storage: Arc<dyn StorageClient>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub async fn connect_db(config: &AppConfig) -> anyhow::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database_url)
            .await
            .context("connect to database")
    }

    pub async fn init(config: AppConfig, db: PgPool) -> anyhow::Result<Self> {
        let clock = SystemClock::new(config.utc_offset()?);

        let storage = S3Storage::new(&config.storage)
            .await
            .context("configure object storage")?;
        let extractor = GeminiClient::new(&config.gemini).context("configure gemini client")?;

        Ok(Self {
            config: Arc::new(config),
            users: Arc::new(PgUserRepository::new(db.clone())),
            meals: Arc::new(PgMealRepository::new(db.clone())),
            streaks: Arc::new(PgStreakRepository::new(db)),
            extractor: Arc::new(extractor),
            storage: Arc::new(storage),
            clock: Arc::new(clock),
        })
    }
}

#[cfg(test)]
impl AppState {
    pub fn fake() -> Self {
        crate::testing::Fakes::default().state()
    }
}
