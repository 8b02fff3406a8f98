use crate::{
    error::Result,
    models::{Generation, NewGeneration, User},
};
use async_trait::async_trait;

#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Fails with `StudioError::Conflict` when the email is already taken.
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn insert_generation(&self, generation: NewGeneration) -> Result<Generation>;

    /// Most recent first, only rows owned by `user_id`.
    async fn recent_generations(&self, user_id: i64, limit: usize) -> Result<Vec<Generation>>;
    async fn generation_by_id(&self, id: i64, user_id: i64) -> Result<Option<Generation>>;

    async fn health_check(&self) -> Result<bool>;
}
