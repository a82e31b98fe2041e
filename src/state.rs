use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::accounts::SqliteAccountRepository;
use crate::config::Config;
use crate::notifications::SqliteNotificationRepository;
use crate::posts::SqlitePostRepository;
use crate::recommend::RecommendationClient;
use crate::social::SqliteSocialGraphRepository;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub recommender: Arc<RecommendationClient>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> anyhow::Result<Self> {
        let recommender = RecommendationClient::new(
            config.recommender.base_url.clone(),
            config.recommender.timeout(),
        )?;

        Ok(Self {
            db,
            config,
            recommender: Arc::new(recommender),
        })
    }

    pub fn accounts(&self) -> SqliteAccountRepository {
        SqliteAccountRepository::new(self.db.clone(), self.config.auth.bcrypt_cost)
    }

    pub fn posts(&self) -> SqlitePostRepository {
        SqlitePostRepository::new(self.db.clone())
    }

    pub fn social(&self) -> SqliteSocialGraphRepository {
        SqliteSocialGraphRepository::new(self.db.clone())
    }

    pub fn notifications(&self) -> SqliteNotificationRepository {
        SqliteNotificationRepository::new(self.db.clone())
    }
}
