use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChatError, Result};
use crate::state::ChatRole;
use crate::stream::DeltaStream;

/// Raw body chunks of one streaming response. Consumed exactly once.
pub type ByteStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    pub options: ChatOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            options: ChatOptions { temperature },
        }
    }
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Open a streaming chat request and hand back the raw body chunks.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(%url, model = %request.model, "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                ChatError::Connection(format!(
                    "{}. Make sure Ollama is running with: ollama serve",
                    e
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Connection(format!(
                "Ollama request failed with status: {}. {}",
                status,
                body.trim()
            )));
        }

        Ok(response.bytes_stream().boxed())
    }

    /// Open a streaming chat request and decode it into text deltas.
    pub async fn chat(&self, request: &ChatRequest) -> Result<DeltaStream<ByteStream>> {
        Ok(DeltaStream::new(self.stream_chat(request).await?))
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ChatError::Connection(format!(
                "Failed to list models: {}",
                response.status()
            )));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }
}
