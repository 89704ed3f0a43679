
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::OpenAiConfig;
use crate::rag::{ChatMessage, CompletionProvider, EmbeddingProvider};
use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// HTTP client for Azure OpenAI embeddings and chat completions.
///
/// Calls are synchronous (ureq) and never retried; upstream failures surface
/// to the caller with their stage attached so retry policy stays with them.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    endpoint: Url,
    api_key: String,
    api_version: String,
    embeddings_deployment: String,
    completions_deployment: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let endpoint = config
            .endpoint_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            embeddings_deployment: config.embeddings_deployment.clone(),
            completions_deployment: config.completions_deployment.clone(),
            agent,
        })
    }

    /// Generate an embedding vector for a single text input.
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = self.deployment_url(&self.embeddings_deployment, "embeddings")?;
        let request = EmbeddingRequest { input: text };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Embedding(format!("Failed to serialize request: {}", e)))?;

        let response_text = self
            .send_json(&self.agent, &url, &request_json)
            .map_err(RagError::Embedding)?;

        let response: EmbeddingResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse response: {}", e)))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::Embedding("Response contained no embedding".to_string()))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    /// Submit a conversation to the completions deployment and return the
    /// first generated message's content verbatim.
    #[inline]
    pub fn chat_completion(&self, messages: &[ChatMessage], timeout: Duration) -> Result<String> {
        debug!("Requesting chat completion for {} messages", messages.len());

        let url = self.deployment_url(&self.completions_deployment, "chat/completions")?;
        let request = ChatCompletionRequest { messages };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Completion(format!("Failed to serialize request: {}", e)))?;

        // The completion call carries its own bounded wait; a one-off agent
        // keeps the shared agent's default timeout untouched.
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        let response_text = self
            .send_json(&agent, &url, &request_json)
            .map_err(RagError::Completion)?;

        let response: ChatCompletionResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Completion(format!("Failed to parse response: {}", e)))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RagError::Completion("Response contained no choices".to_string()))?;

        debug!("Received completion ({} chars)", content.len());
        Ok(content)
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> Result<Url> {
        let mut url = self
            .endpoint
            .join(&format!("openai/deployments/{}/{}", deployment, operation))
            .map_err(|e| RagError::Config(format!("Failed to build deployment URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    fn send_json(
        &self,
        agent: &ureq::Agent,
        url: &Url,
        body: &str,
    ) -> std::result::Result<String, String> {
        agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .header("api-key", &self.api_key)
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|error| match error {
                ureq::Error::StatusCode(status) => format!("HTTP {}", status),
                ureq::Error::Timeout(_) => format!("Request timed out: {}", error),
                _ => format!("Request failed: {}", error),
            })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let client = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || client.generate_embedding(&text))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage], timeout: Duration) -> Result<String> {
        let client = self.clone();
        let messages = messages.to_vec();
        tokio::task::spawn_blocking(move || client.chat_completion(&messages, timeout))
            .await
            .map_err(|e| RagError::Completion(format!("Completion task failed: {}", e)))?
    }
}
