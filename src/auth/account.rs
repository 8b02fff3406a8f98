use crate::{
    auth::token::CredentialService,
    error::{Result, StudioError},
    models::{AuthResponse, Credentials, PublicUser},
    storage::GenerationStore,
};
use std::sync::Arc;

/// Signup and login on top of the generation store.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn GenerationStore>,
    credentials: CredentialService,
}

impl AccountService {
    pub fn new(store: Arc<dyn GenerationStore>, credentials: CredentialService) -> Self {
        Self { store, credentials }
    }

    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }

    pub async fn signup(&self, credentials: &Credentials) -> Result<AuthResponse> {
        credentials.validate()?;
        let email = credentials.normalized_email();

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(StudioError::Conflict("User already exists".to_string()));
        }

        let password_hash = self.hash_password(&credentials.password).await?;
        let user = self.store.create_user(&email, &password_hash).await?;
        log::info!("👤 New account {} (id {})", user.email, user.id);

        let token = self.credentials.issue_token(user.id, &user.email)?;
        Ok(AuthResponse {
            user: PublicUser::from(&user),
            token,
        })
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse> {
        let email = credentials.normalized_email();
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(StudioError::InvalidCredentials)?;

        if !self
            .verify_password(&credentials.password, user.password_hash.clone())
            .await?
        {
            log::debug!("Rejected login for {}", email);
            return Err(StudioError::InvalidCredentials);
        }

        let token = self.credentials.issue_token(user.id, &user.email)?;
        Ok(AuthResponse {
            user: PublicUser::from(&user),
            token,
        })
    }

    // Argon2 runs on the blocking pool.
    async fn hash_password(&self, password: &str) -> Result<String> {
        let credentials = self.credentials.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || credentials.hash_password(&password))
            .await
            .map_err(|e| StudioError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    async fn verify_password(&self, password: &str, password_hash: String) -> Result<bool> {
        let credentials = self.credentials.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || credentials.verify_password(&password, &password_hash))
            .await
            .map_err(|e| StudioError::Internal(format!("Password check task failed: {}", e)))?
    }
}
