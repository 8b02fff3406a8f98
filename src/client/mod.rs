pub mod http;
pub mod local;
pub mod retry;

use crate::{
    error::{Result, StudioError},
    models::{GenerationRequest, GenerationResult},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use http::StudioClient;
pub use local::LocalBackend;
pub use retry::{ControllerSnapshot, GenerationOutcome, RetryController, RetryPolicy};

/// Something that can run one generation attempt.
///
/// Implementations must return `StudioError::Cancelled` once `cancel` fires,
/// `StudioError::Overloaded` for the transient overload signal, and any other
/// error for a failure that should not be retried.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn submit(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult>;
}

#[async_trait]
impl<B: GenerationBackend + ?Sized> GenerationBackend for Arc<B> {
    async fn submit(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        (**self).submit(request, cancel).await
    }
}

#[async_trait]
impl GenerationBackend for StudioClient {
    async fn submit(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        self.create(request, cancel).await
    }
}

pub(crate) fn cancelled<T>() -> Result<T> {
    Err(StudioError::Cancelled)
}
