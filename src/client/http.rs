use crate::{
    client::cancelled,
    config::ClientConfig,
    error::{Result, StudioError},
    models::{AuthResponse, CreateGenerationBody, Credentials, GenerationRequest, GenerationResult},
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// HTTP client for the studio API.
#[derive(Clone)]
pub struct StudioClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl StudioClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn signup(&self, credentials: &Credentials) -> Result<AuthResponse> {
        let response = self
            .client
            .post(self.url("/auth/signup"))
            .json(credentials)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(credentials)
            .send()
            .await?;
        decode(response).await
    }

    /// Submits one generation. Resolves to `StudioError::Cancelled` as soon as
    /// `cancel` fires; the in-flight request is dropped.
    pub async fn create(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        let body = CreateGenerationBody::from(request);
        let call = async {
            let response = self
                .authorized(self.client.post(self.url("/generations")))
                .json(&body)
                .send()
                .await?;
            decode(response).await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => cancelled(),
            result = call => result,
        }
    }

    pub async fn recent(&self, limit: Option<usize>) -> Result<Vec<GenerationResult>> {
        let mut request = self.authorized(self.client.get(self.url("/generations")));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        decode(request.send().await?).await
    }

    pub async fn generation(&self, id: i64) -> Result<GenerationResult> {
        let response = self
            .authorized(self.client.get(self.url(&format!("/generations/{}", id))))
            .send()
            .await?;
        decode(response).await
    }
}

/// Success bodies decode into `T`; failures become a `StudioError` built from
/// the status and the body's `error` or `message` field.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body: Option<Value> = response.json().await.ok();
    let message = body
        .as_ref()
        .and_then(|body| body.get("error").or_else(|| body.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string);

    log::debug!("Studio API returned {}: {:?}", status, message);
    Err(StudioError::from_status(status.as_u16(), message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = StudioClient::new(ClientConfig::new("http://localhost:3001/api/")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3001/api");
        assert_eq!(client.url("/generations"), "http://localhost:3001/api/generations");
        assert!(client.token().is_none());
        assert_eq!(client.with_token("abc").token(), Some("abc"));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let client = StudioClient::new(ClientConfig::new("http://127.0.0.1:9/api")).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client
            .create(&GenerationRequest::new("A beautiful sunset", "Realistic"), &cancel)
            .await;
        assert!(matches!(result, Err(StudioError::Cancelled)));
    }
}
