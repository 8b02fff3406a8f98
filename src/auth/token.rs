use crate::{
    config::AuthConfig,
    error::{Result, StudioError},
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const INVALID_TOKEN: &str = "Invalid or expired token";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub")]
    pub user_id: i64,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Password hashing and bearer token issuance.
///
/// Tokens are `<payload>.<signature>`: the payload is base64url JSON
/// [`Claims`], the signature an HMAC-SHA256 of the encoded payload.
#[derive(Clone)]
pub struct CredentialService {
    secret: Vec<u8>,
    token_ttl: chrono::Duration,
}

impl CredentialService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            secret: config.secret.as_bytes().to_vec(),
            token_ttl: config.token_ttl,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| StudioError::Internal(format!("Failed to encode salt: {}", e)))?;

        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StudioError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    pub fn verify_password(&self, password: &str, password_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| StudioError::Internal(format!("Stored password hash is invalid: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    pub fn issue_token(&self, user_id: i64, email: &str) -> Result<String> {
        let now = Utc::now();
        let expires = now.checked_add_signed(self.token_ttl).ok_or_else(|| {
            StudioError::Config(format!("Token lifetime {} is out of range", self.token_ttl))
        })?;
        let claims = Claims {
            user_id,
            email: email.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes())?);
        Ok(format!("{}.{}", payload, signature))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let invalid = || StudioError::Forbidden(INVALID_TOKEN.to_string());

        let (payload, signature) = token.split_once('.').ok_or_else(invalid)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature.as_bytes())
            .map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload.as_bytes())
            .map_err(|_| invalid())?;
        let claims: Claims = serde_json::from_slice(&raw).map_err(|_| invalid())?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(invalid());
        }
        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| StudioError::Internal(format!("Invalid signing key: {}", e)))
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CredentialService {
        CredentialService::new(&AuthConfig::default().with_secret("test-secret"))
    }

    #[test]
    fn test_password_roundtrip() {
        let credentials = service();
        let hash = credentials.hash_password("password123").unwrap();
        assert_ne!(hash, "password123");
        assert!(credentials.verify_password("password123", &hash).unwrap());
        assert!(!credentials.verify_password("password124", &hash).unwrap());
    }

    #[test]
    fn test_token_carries_identity() {
        let credentials = service();
        let token = credentials.issue_token(42, "test@example.com").unwrap();
        let claims = credentials.verify_token(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.exp - claims.iat, chrono::Duration::days(7).num_seconds());
    }

    #[test]
    fn test_tampered_or_foreign_tokens_are_rejected() {
        let credentials = service();
        let token = credentials.issue_token(1, "a@example.com").unwrap();

        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims {
                user_id: 2,
                email: "b@example.com".into(),
                iat: 0,
                exp: i64::MAX,
            })
            .unwrap(),
        );
        let signature = token.split_once('.').unwrap().1;
        let forged = format!("{}.{}", forged_payload, signature);
        assert!(matches!(
            credentials.verify_token(&forged),
            Err(StudioError::Forbidden(_))
        ));

        let other = CredentialService::new(&AuthConfig::default().with_secret("other-secret"));
        assert!(other.verify_token(&token).is_err());
        assert!(credentials.verify_token("garbage").is_err());
        assert!(credentials.verify_token("").is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let credentials = CredentialService::new(
            &AuthConfig::default()
                .with_secret("test-secret")
                .with_token_ttl(chrono::Duration::seconds(-1)),
        );
        let token = credentials.issue_token(1, "a@example.com").unwrap();
        assert!(matches!(
            credentials.verify_token(&token),
            Err(StudioError::Forbidden(_))
        ));
    }

    #[test]
    fn test_out_of_range_ttl_is_an_error() {
        let credentials = CredentialService::new(
            &AuthConfig::default()
                .with_secret("test-secret")
                .with_token_ttl(chrono::Duration::hours(3_000_000_000)),
        );
        assert!(matches!(
            credentials.issue_token(1, "a@example.com"),
            Err(StudioError::Config(_))
        ));
    }
}
