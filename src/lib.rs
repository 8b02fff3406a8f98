pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod generation;
pub mod logger;
pub mod models;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;

pub use auth::{AccountService, CredentialService};
pub use client::{
    ControllerSnapshot, GenerationBackend, GenerationOutcome, LocalBackend, RetryController,
    RetryPolicy, StudioClient,
};
pub use config::{
    AuthConfig, ClientConfig, Config, DatabaseConfig, PostgresConfig, SimulationConfig,
    UploadConfig,
};
pub use error::{Result, RetryClass, StudioError};
pub use generation::{GenerationService, SimulationPolicy};
pub use models::{
    Credentials, Generation, GenerationRequest, GenerationResult, GenerationStatus, ImageUpload,
};
pub use storage::{GenerationStore, StorageManager};
