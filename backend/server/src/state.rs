use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{
    config::Config,
    database::{Database, DatabaseError},
};

pub struct AppState {
    pub config: Config,
    pub database: Database,
    /// Held while device documents are read and rewritten: checkout stock decrements
    /// and admin device edits.
    pub catalog: Mutex<()>,
    /// Held across the email/employee id uniqueness check and the account write.
    pub accounts: Mutex<()>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, DatabaseError> {
        let database = match &config.redis_url {
            Some(redis_url) => {
                info!("Connecting to Redis...");
                Database::connect(redis_url).await?
            }
            None => {
                warn!("REDIS_URL not set, documents are kept in memory only");
                Database::memory()
            }
        };

        Ok(Self::with_database(config, database))
    }

    pub fn with_database(config: Config, database: Database) -> Arc<Self> {
        Arc::new(Self {
            config,
            database,
            catalog: Mutex::new(()),
            accounts: Mutex::new(()),
        })
    }
}
