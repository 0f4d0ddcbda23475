//! Generative-service collaborator.
//!
//! The controller only sees [`GenerativeService`]. [`AnthropicClient`] is the
//! production implementation over the messages HTTP API; tests use
//! [`crate::fakes::ScriptedService`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ServiceConfig;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no API key configured (set ANTHROPIC_API_KEY)")]
    MissingApiKey,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned no text content")]
    EmptyResponse,

    #[error("no scripted response left for {0}")]
    Exhausted(String),
}

/// One instruction to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Label for logs and fakes, e.g. `stage1:climax`.
    pub label: String,
    pub system: String,
    pub prompt: String,
}

impl ServiceRequest {
    pub fn new(label: impl Into<String>, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Raw text returned by the service plus usage counters when known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub text: String,
    pub model: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

impl ServiceResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait GenerativeService: Send + Sync {
    /// Send one request and wait for the complete response.
    async fn generate(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError>;
}

// ---------------------------------------------------------------------------
// Messages API client
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

/// Client for the Anthropic messages API.
pub struct AnthropicClient {
    config: ServiceConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ServiceError::MissingApiKey)?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("litkernel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            config,
            api_key,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerativeService for AnthropicClient {
    async fn generate(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: &request.system,
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        debug!(label = %request.label, model = %self.config.model, "sending service request");
        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyResponse);
        }

        let usage = parsed.usage;
        Ok(ServiceResponse {
            text,
            model: parsed.model,
            input_tokens: usage.as_ref().and_then(|u| u.input_tokens),
            output_tokens: usage.as_ref().and_then(|u| u.output_tokens),
        })
    }
}
