pub mod postgres;
pub mod sqlite;
pub mod traits;
pub mod uploads;

use crate::{config::Config, error::Result};
use std::sync::Arc;

pub use postgres::PostgresGenerationStore;
pub use sqlite::SqliteGenerationStore;
pub use traits::GenerationStore;
pub use uploads::UploadStore;

/// Chooses the generation store backend from configuration.
#[derive(Clone)]
pub struct StorageManager {
    backend: Arc<dyn GenerationStore>,
}

impl StorageManager {
    pub async fn new(config: &Config) -> Result<Self> {
        let backend: Arc<dyn GenerationStore> = if config.use_psql {
            #[cfg(feature = "postgres")]
            {
                let postgres_config = config.postgres.clone().ok_or_else(|| {
                    crate::error::StudioError::Config("PostgreSQL config required".into())
                })?;
                Arc::new(PostgresGenerationStore::new(postgres_config).await?)
            }
            #[cfg(not(feature = "postgres"))]
            {
                return Err(crate::error::StudioError::Config(
                    "PostgreSQL feature not enabled".into(),
                ));
            }
        } else {
            Arc::new(SqliteGenerationStore::open(config.database.path.as_deref())?)
        };

        Ok(Self { backend })
    }

    pub fn from_store(backend: Arc<dyn GenerationStore>) -> Self {
        Self { backend }
    }

    pub fn store(&self) -> Arc<dyn GenerationStore> {
        Arc::clone(&self.backend)
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.backend.health_check().await
    }
}
