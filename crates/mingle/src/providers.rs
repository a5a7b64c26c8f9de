#![forbid(unsafe_code)]

//! Embedding and generation model providers.
//!
//! Both talk to an OpenAI-compatible HTTP API. The engine only sees the
//! traits, so tests and alternative hosts can inject their own.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Maps text to a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of every vector this provider returns.
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// A chat-style generation model, asked either for a JSON object or plain text.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    async fn generate_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    async fn generate_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn new(client: reqwest::Client, config: &EngineConfig, api_key: String) -> Self {
        Self {
            client,
            endpoint: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.embedding_model.clone(),
            dims: config.embedding_dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.endpoint);
        let request = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
        };

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Embedding(format!("API error {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Embedding(format!("malformed response: {e}")))?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EngineError::Embedding("empty response".to_string()))?;

        if embedding.len() != self.dims {
            return Err(EngineError::Embedding(format!(
                "expected {} dimensions, got {}",
                self.dims,
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    json_temperature: f32,
    text_temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(client: reqwest::Client, config: &EngineConfig, api_key: String) -> Self {
        Self {
            client,
            endpoint: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.generation_model.clone(),
            json_temperature: config.rag_temperature,
            text_temperature: config.traversal_temperature,
        }
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        json: bool,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
            response_format: json.then_some(ResponseFormat {
                r#type: "json_object",
            }),
        };

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Generation(format!("API error {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

#[async_trait]
impl GenerationModel for OpenAiGenerator {
    async fn generate_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.complete(system_prompt, user_prompt, self.json_temperature, true)
            .await
    }

    async fn generate_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.complete(system_prompt, user_prompt, self.text_temperature, false)
            .await
    }
}
