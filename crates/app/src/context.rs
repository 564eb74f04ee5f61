//! App Context

use std::sync::Arc;

use conditions::service::{ConditionsService, StoreConditionsService};
use thiserror::Error;

use crate::{config::DatabaseConfig, database, store::PgEntityStore};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),
}

#[derive(Clone)]
pub struct AppContext {
    pub conditions: Arc<dyn ConditionsService>,
}

impl AppContext {
    /// Build application context from database settings.
    ///
    /// # Errors
    ///
    /// Returns an error when establishing a database connection fails.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, AppInitError> {
        let pool = database::connect(config)
            .await
            .map_err(AppInitError::Database)?;

        Ok(Self {
            conditions: Arc::new(StoreConditionsService::new(Arc::new(PgEntityStore::new(
                pool,
            )))),
        })
    }
}
