#[cfg(feature = "postgres")]
use crate::{
    config::PostgresConfig,
    error::{Result, StudioError},
    models::{Generation, GenerationStatus, NewGeneration, User},
    storage::traits::GenerationStore,
};

#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use deadpool_postgres::{Config, Object, Pool, Runtime};
#[cfg(feature = "postgres")]
use tokio_postgres::{error::SqlState, NoTls, Row};

#[cfg(feature = "postgres")]
pub struct PostgresGenerationStore {
    pool: Pool,
}

#[cfg(feature = "postgres")]
impl PostgresGenerationStore {
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = config.host;
        cfg.port = config.port;
        cfg.user = config.username;
        cfg.password = config.password;
        cfg.dbname = config.database;

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StudioError::Config(format!("Failed to create pool: {}", e)))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StudioError::Storage(format!("Failed to get connection: {}", e)))
    }

    async fn initialize_schema(&self) -> Result<()> {
        let client = self.client().await?;

        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS users (
                    id BIGSERIAL PRIMARY KEY,
                    email TEXT UNIQUE NOT NULL,
                    password TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                CREATE TABLE IF NOT EXISTS generations (
                    id BIGSERIAL PRIMARY KEY,
                    user_id BIGINT NOT NULL REFERENCES users(id),
                    prompt TEXT NOT NULL,
                    style TEXT NOT NULL,
                    image_url TEXT NOT NULL,
                    original_image_url TEXT,
                    status TEXT NOT NULL DEFAULT 'completed'
                        CHECK (status IN ('completed', 'failed')),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS idx_generations_user_created
                    ON generations(user_id, created_at DESC);",
            )
            .await
            .map_err(|e| StudioError::Storage(format!("Failed to create schema: {}", e)))?;

        log::info!("PostgreSQL generation store schema initialized");
        Ok(())
    }
}

#[cfg(feature = "postgres")]
fn user_from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password"),
        created_at: row.get("created_at"),
    }
}

#[cfg(feature = "postgres")]
fn generation_from_row(row: &Row) -> Result<Generation> {
    let status: String = row.get("status");
    Ok(Generation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        prompt: row.get("prompt"),
        style: row.get("style"),
        image_url: row.get("image_url"),
        original_image_url: row.get("original_image_url"),
        status: status.parse::<GenerationStatus>()?,
        created_at: row.get("created_at"),
    })
}

#[cfg(feature = "postgres")]
#[async_trait]
impl GenerationStore for PostgresGenerationStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO users (email, password) VALUES ($1, $2)
                 RETURNING id, email, password, created_at",
                &[&email, &password_hash],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    StudioError::Conflict("User already exists".to_string())
                } else {
                    StudioError::Storage(format!("Failed to insert user: {}", e))
                }
            })?;
        Ok(user_from_row(&row))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, email, password, created_at FROM users WHERE email = $1",
                &[&email],
            )
            .await
            .map_err(|e| StudioError::Storage(format!("Failed to query user: {}", e)))?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn insert_generation(&self, generation: NewGeneration) -> Result<Generation> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO generations
                    (user_id, prompt, style, image_url, original_image_url, status)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id, user_id, prompt, style, image_url, original_image_url, status, created_at",
                &[
                    &generation.user_id,
                    &generation.prompt,
                    &generation.style,
                    &generation.image_url,
                    &generation.original_image_url,
                    &generation.status.as_str(),
                ],
            )
            .await
            .map_err(|e| StudioError::Storage(format!("Failed to insert generation: {}", e)))?;
        generation_from_row(&row)
    }

    async fn recent_generations(&self, user_id: i64, limit: usize) -> Result<Vec<Generation>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, user_id, prompt, style, image_url, original_image_url, status, created_at
                 FROM generations
                 WHERE user_id = $1
                 ORDER BY created_at DESC, id DESC
                 LIMIT $2",
                &[&user_id, &(limit as i64)],
            )
            .await
            .map_err(|e| StudioError::Storage(format!("Failed to list generations: {}", e)))?;
        rows.iter().map(generation_from_row).collect()
    }

    async fn generation_by_id(&self, id: i64, user_id: i64) -> Result<Option<Generation>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, user_id, prompt, style, image_url, original_image_url, status, created_at
                 FROM generations WHERE id = $1 AND user_id = $2",
                &[&id, &user_id],
            )
            .await
            .map_err(|e| StudioError::Storage(format!("Failed to query generation: {}", e)))?;
        row.as_ref().map(generation_from_row).transpose()
    }

    async fn health_check(&self) -> Result<bool> {
        let client = self.client().await?;

        client
            .execute("SELECT 1", &[])
            .await
            .map_err(|_| StudioError::Storage("Health check query failed".into()))?;

        Ok(true)
    }
}

#[cfg(not(feature = "postgres"))]
pub struct PostgresGenerationStore;

#[cfg(not(feature = "postgres"))]
impl PostgresGenerationStore {
    pub async fn new(_config: crate::config::PostgresConfig) -> crate::error::Result<Self> {
        Err(crate::error::StudioError::Config(
            "PostgreSQL feature not enabled".into(),
        ))
    }
}
