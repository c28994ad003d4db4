use crate::core::config::ApiConfig;
use crate::services::protocol::{ChatRequest, StepResponse};
use async_trait::async_trait;
use log::debug;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not authorized")]
    Unauthorized,

    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

#[cfg(target_arch = "wasm32")]
pub trait ApiBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> ApiBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait ApiBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> ApiBounds for T {}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait StoryApi: ApiBounds {
    async fn chat(&self, token: &str, request: &ChatRequest) -> Result<StepResponse, ApiError>;
}

#[derive(Serialize, Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait AuthApi: ApiBounds {
    /// Returns the access token.
    async fn login(&self, credentials: &Credentials) -> Result<String, ApiError>;
    /// Returns the server's confirmation message.
    async fn register(&self, credentials: &Credentials) -> Result<String, ApiError>;
    async fn logout(&self, token: &str) -> Result<(), ApiError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpStoryApi {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpStoryApi {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let mut base = config.base_url.trim().to_string();
        // Url::join drops the last path segment unless it ends with a slash
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        #[cfg(not(target_arch = "wasm32"))]
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()?;
        #[cfg(target_arch = "wasm32")]
        let client = reqwest::Client::new();

        Ok(Self { base_url, client })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized);
        }

        let text = resp.text().await.unwrap_or_default();
        Err(ApiError::Server {
            status: status.as_u16(),
            message: error_message(status, &text),
        })
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error
        .or(parsed.detail)
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string())
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let text = resp.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| ApiError::Decode(format!("{}. Body: {}", e, text)))
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl StoryApi for HttpStoryApi {
    async fn chat(&self, token: &str, request: &ChatRequest) -> Result<StepResponse, ApiError> {
        let url = self.endpoint("chat/")?;
        debug!("POST {} step={} story={}", url, request.step, request.story_id);

        let resp = self
            .client
            .post(url)
            .header(AUTHORIZATION, token)
            .json(request)
            .send()
            .await?;

        decode(Self::check(resp).await?).await
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl AuthApi for HttpStoryApi {
    async fn login(&self, credentials: &Credentials) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(self.endpoint("login/")?)
            .json(credentials)
            .send()
            .await?;

        let body: TokenResponse = decode(Self::check(resp).await?).await?;
        Ok(body.token)
    }

    async fn register(&self, credentials: &Credentials) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(self.endpoint("register/")?)
            .json(credentials)
            .send()
            .await?;

        let body: MessageResponse = decode(Self::check(resp).await?).await?;
        Ok(body.message.unwrap_or_else(|| "Registered".to_string()))
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .post(self.endpoint("logout/")?)
            .header(AUTHORIZATION, token)
            .send()
            .await?;

        Self::check(resp).await?;
        Ok(())
    }
}
