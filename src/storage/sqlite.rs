use crate::{
    error::{Result, StudioError},
    models::{Generation, GenerationStatus, NewGeneration, User},
    storage::traits::GenerationStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    email       TEXT UNIQUE NOT NULL,
    password    TEXT NOT NULL,
    created_at  DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS generations (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id             INTEGER NOT NULL REFERENCES users(id),
    prompt              TEXT NOT NULL,
    style               TEXT NOT NULL,
    image_url           TEXT NOT NULL,
    original_image_url  TEXT,
    status              TEXT NOT NULL DEFAULT 'completed'
                        CHECK(status IN ('completed', 'failed')),
    created_at          DATETIME NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_generations_user_created ON generations(user_id, created_at);
"#;

const GENERATION_COLUMNS: &str =
    "id, user_id, prompt, style, image_url, original_image_url, status, created_at";

pub struct SqliteGenerationStore {
    conn: Mutex<Connection>,
}

impl SqliteGenerationStore {
    /// Open (or create) the database. Pass `None` for an in-memory database.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let conn = match path {
            Some(p) => {
                if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(p)?
            }
            None => Connection::open_in_memory()?,
        };

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;

        log::info!(
            "SQLite generation store ready ({})",
            path.map_or_else(|| "in-memory".to_string(), |p| p.display().to_string())
        );
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(None)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        password_hash: row.get("password")?,
        created_at: row.get("created_at")?,
    })
}

fn generation_from_row(row: &Row) -> rusqlite::Result<Generation> {
    let status: String = row.get("status")?;
    let status = status.parse::<GenerationStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Generation {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        prompt: row.get("prompt")?,
        style: row.get("style")?,
        image_url: row.get("image_url")?,
        original_image_url: row.get("original_image_url")?,
        status,
        created_at: row.get("created_at")?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl GenerationStore for SqliteGenerationStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let conn = self.conn();
        let created_at: DateTime<Utc> = Utc::now();
        conn.execute(
            "INSERT INTO users (email, password, created_at) VALUES (?1, ?2, ?3)",
            params![email, password_hash, created_at],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StudioError::Conflict("User already exists".to_string())
            } else {
                StudioError::Database(e)
            }
        })?;

        Ok(User {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        let user = conn
            .query_row(
                "SELECT id, email, password, created_at FROM users WHERE email = ?1",
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn insert_generation(&self, generation: NewGeneration) -> Result<Generation> {
        let conn = self.conn();
        let created_at: DateTime<Utc> = Utc::now();
        conn.execute(
            "INSERT INTO generations
                (user_id, prompt, style, image_url, original_image_url, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                generation.user_id,
                generation.prompt,
                generation.style,
                generation.image_url,
                generation.original_image_url,
                generation.status.as_str(),
                created_at
            ],
        )?;

        Ok(Generation {
            id: conn.last_insert_rowid(),
            user_id: generation.user_id,
            prompt: generation.prompt,
            style: generation.style,
            image_url: generation.image_url,
            original_image_url: generation.original_image_url,
            status: generation.status,
            created_at,
        })
    }

    async fn recent_generations(&self, user_id: i64, limit: usize) -> Result<Vec<Generation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM generations
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
            GENERATION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id, limit as i64], generation_from_row)?;
        let generations = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(generations)
    }

    async fn generation_by_id(&self, id: i64, user_id: i64) -> Result<Option<Generation>> {
        let conn = self.conn();
        let generation = conn
            .query_row(
                &format!(
                    "SELECT {} FROM generations WHERE id = ?1 AND user_id = ?2",
                    GENERATION_COLUMNS
                ),
                params![id, user_id],
                generation_from_row,
            )
            .optional()?;
        Ok(generation)
    }

    async fn health_check(&self) -> Result<bool> {
        let conn = self.conn();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(one == 1)
    }
}
