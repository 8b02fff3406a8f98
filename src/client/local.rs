use crate::{
    client::GenerationBackend,
    error::Result,
    generation::GenerationService,
    models::{GenerationRequest, GenerationResult},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs submissions in-process against a `GenerationService` on behalf of one user.
#[derive(Clone)]
pub struct LocalBackend {
    service: Arc<GenerationService>,
    user_id: i64,
}

impl LocalBackend {
    pub fn new(service: Arc<GenerationService>, user_id: i64) -> Self {
        Self { service, user_id }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}

#[async_trait]
impl GenerationBackend for LocalBackend {
    async fn submit(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        let generation = self.service.create(self.user_id, request, cancel).await?;
        Ok(generation.into())
    }
}
