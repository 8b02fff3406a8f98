use crate::{
    error::{Result, StudioError},
    generation::simulation::SimulationPolicy,
    logger,
    models::{Generation, GenerationRequest, GenerationStatus, NewGeneration},
    storage::{GenerationStore, UploadStore},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn placeholder_image_url() -> String {
    format!(
        "https://picsum.photos/512/512?random={}",
        chrono::Utc::now().timestamp_millis()
    )
}

/// Server side of a generate call: validates, simulates the model, persists.
#[derive(Clone)]
pub struct GenerationService {
    store: Arc<dyn GenerationStore>,
    uploads: Arc<UploadStore>,
    policy: SimulationPolicy,
}

impl GenerationService {
    pub fn new(
        store: Arc<dyn GenerationStore>,
        uploads: Arc<UploadStore>,
        policy: SimulationPolicy,
    ) -> Self {
        Self {
            store,
            uploads,
            policy,
        }
    }

    pub fn policy(&self) -> &SimulationPolicy {
        &self.policy
    }

    /// Runs one submission. Returns `StudioError::Overloaded` for the
    /// simulated transient failure and `StudioError::Cancelled` if `cancel`
    /// fires before anything is persisted.
    pub async fn create(
        &self,
        user_id: i64,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Generation> {
        request.validate(self.uploads.max_bytes())?;
        let _timer = logger::timer("generation");

        let latency = self.policy.sample_latency();
        log::debug!(
            "Simulating model latency of {}ms for user {}",
            latency.as_millis(),
            user_id
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("Generation for user {} cancelled during processing", user_id);
                return Err(StudioError::Cancelled);
            }
            _ = tokio::time::sleep(latency) => {}
        }

        if self.policy.roll_overload() {
            log::warn!("🔥 Simulated model overload for user {}", user_id);
            return Err(StudioError::Overloaded);
        }
        if cancel.is_cancelled() {
            return Err(StudioError::Cancelled);
        }

        let original_image_url = match &request.image {
            Some(image) => Some(self.uploads.save(user_id, image).await?),
            None => None,
        };
        if cancel.is_cancelled() {
            self.discard_upload(original_image_url.as_deref()).await;
            return Err(StudioError::Cancelled);
        }

        let inserted = self
            .store
            .insert_generation(NewGeneration {
                user_id,
                prompt: request.prompt.clone(),
                style: request.style.clone(),
                image_url: placeholder_image_url(),
                original_image_url: original_image_url.clone(),
                status: GenerationStatus::Completed,
            })
            .await;
        let generation = match inserted {
            Ok(generation) => generation,
            Err(e) => {
                self.discard_upload(original_image_url.as_deref()).await;
                return Err(e);
            }
        };

        log::info!(
            "🖼️  Generation {} completed for user {} ({})",
            generation.id,
            user_id,
            generation.style
        );
        Ok(generation)
    }

    /// Drops an upload that no record will reference.
    async fn discard_upload(&self, public_url: Option<&str>) {
        if let Some(url) = public_url {
            if let Err(e) = self.uploads.remove(url).await {
                log::warn!("⚠️  Could not remove orphaned upload {}: {}", url, e);
            }
        }
    }

    pub async fn recent(&self, user_id: i64, limit: usize) -> Result<Vec<Generation>> {
        self.store.recent_generations(user_id, limit).await
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Generation> {
        self.store
            .generation_by_id(id, user_id)
            .await?
            .ok_or_else(|| StudioError::NotFound("Generation not found".to_string()))
    }
}
