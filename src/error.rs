use thiserror::Error;

pub const GENERIC_FAILURE: &str = "Generation failed";

#[derive(Error, Debug)]
pub enum StudioError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Model overloaded")]
    Overloaded,

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status})")]
    Api { status: u16, message: Option<String> },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The only distinction the retry controller is allowed to make about a
/// failed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Cancelled,
    Fatal,
}

impl StudioError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            StudioError::Overloaded => RetryClass::Retryable,
            StudioError::Cancelled => RetryClass::Cancelled,
            _ => RetryClass::Fatal,
        }
    }

    /// Message safe to show to an end user, if the failing layer provided one.
    pub fn user_message(&self) -> Option<String> {
        match self {
            StudioError::Validation(msg)
            | StudioError::Unauthorized(msg)
            | StudioError::Forbidden(msg)
            | StudioError::NotFound(msg)
            | StudioError::Conflict(msg) => Some(msg.clone()),
            StudioError::InvalidCredentials => Some("Invalid credentials".to_string()),
            StudioError::Overloaded => Some("Model overloaded".to_string()),
            StudioError::Api { message, .. } => message.clone(),
            _ => None,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            StudioError::Validation(_) => 400,
            StudioError::Unauthorized(_) | StudioError::InvalidCredentials => 401,
            StudioError::Forbidden(_) => 403,
            StudioError::NotFound(_) => 404,
            StudioError::Conflict(_) => 409,
            StudioError::Overloaded => 503,
            StudioError::Api { status, .. } => *status,
            _ => 500,
        }
    }

    /// Rebuilds an error from an API response status and its `error`/`message` body field.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        let text = |fallback: &str| message.clone().unwrap_or_else(|| fallback.to_string());
        match status {
            400 => StudioError::Validation(text("Bad request")),
            401 => StudioError::Unauthorized(text("Unauthorized")),
            403 => StudioError::Forbidden(text("Forbidden")),
            404 => StudioError::NotFound(text("Not found")),
            409 => StudioError::Conflict(text("Conflict")),
            503 => StudioError::Overloaded,
            _ => StudioError::Api { status, message },
        }
    }
}

#[cfg(feature = "server")]
mod http {
    use super::StudioError;
    use actix_web::{http::StatusCode, HttpResponse, ResponseError};
    use serde_json::json;

    impl ResponseError for StudioError {
        fn status_code(&self) -> StatusCode {
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }

        fn error_response(&self) -> HttpResponse {
            let status = self.status_code();
            match self {
                StudioError::Overloaded => {
                    HttpResponse::build(status).json(json!({ "message": "Model overloaded" }))
                }
                _ if status.is_server_error() => {
                    log::error!("Request failed: {}", self);
                    HttpResponse::build(status).json(json!({ "error": "Internal server error" }))
                }
                _ => {
                    let message = self.user_message().unwrap_or_else(|| self.to_string());
                    HttpResponse::build(status).json(json!({ "error": message }))
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_overload_is_retryable() {
        assert_eq!(StudioError::Overloaded.retry_class(), RetryClass::Retryable);
        assert_eq!(StudioError::Cancelled.retry_class(), RetryClass::Cancelled);
        assert_eq!(
            StudioError::Validation("Prompt is required".into()).retry_class(),
            RetryClass::Fatal
        );
        assert_eq!(
            StudioError::Forbidden("Invalid or expired token".into()).retry_class(),
            RetryClass::Fatal
        );
        assert_eq!(
            StudioError::Internal("boom".into()).retry_class(),
            RetryClass::Fatal
        );
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            StudioError::from_status(503, None),
            StudioError::Overloaded
        ));
        match StudioError::from_status(400, Some("Prompt too long".into())) {
            StudioError::Validation(msg) => assert_eq!(msg, "Prompt too long"),
            other => panic!("unexpected {:?}", other),
        }
        match StudioError::from_status(502, None) {
            StudioError::Api { status, message } => {
                assert_eq!(status, 502);
                assert!(message.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_user_message_hides_internal_details() {
        assert_eq!(StudioError::Internal("secret".into()).user_message(), None);
        assert_eq!(StudioError::Storage("disk".into()).user_message(), None);
        assert_eq!(
            StudioError::Conflict("User already exists".into()).user_message(),
            Some("User already exists".to_string())
        );
    }
}
