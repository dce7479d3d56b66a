//! Blocking client for OpenAI-compatible HTTP APIs
//!
//! Shared by the embedding and generation providers. Each call is a single
//! request with the configured timeout; nothing is retried.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{ApiKey, ServiceFailure};

/// Client bound to one base URL and one API key.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: ApiKey,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

// Request/response types for /embeddings
#[derive(Serialize)]
pub(crate) struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a [&'a str],
}

#[derive(Deserialize)]
pub(crate) struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
pub(crate) struct EmbeddingData {
    pub index: usize,
    pub embedding: Vec<f32>,
}

// Request/response types for /chat/completions
#[derive(Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub temperature: f32,
}

#[derive(Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: ApiKey,
        timeout: Duration,
    ) -> std::result::Result<Self, ServiceFailure> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceFailure::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// POST a JSON body to `{base_url}/{path}` and decode the JSON reply.
    pub fn post<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
    ) -> std::result::Result<Resp, ServiceFailure>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(body)
            .send()
            .map_err(|e| ServiceFailure::Network(self.api_key.redact(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(self.failure(status, &text));
        }

        response
            .json::<Resp>()
            .map_err(|e| ServiceFailure::InvalidResponse(e.to_string()))
    }

    fn failure(&self, status: StatusCode, body: &str) -> ServiceFailure {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceFailure::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => ServiceFailure::RateLimited,
            _ => {
                let message = serde_json::from_str::<ErrorResponse>(body)
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| body.trim().to_string());
                ServiceFailure::Status {
                    status: status.as_u16(),
                    message: self.api_key.redact(&message),
                }
            }
        }
    }
}
