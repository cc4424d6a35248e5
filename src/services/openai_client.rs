//! OpenAI API client
//!
//! One reqwest-backed client implementing the three AI collaborator traits:
//! Whisper transcription, text embeddings, and chat completion. Every call is
//! bounded by the HTTP client timeout; a timed-out call fails, it does not
//! hang. Nothing here retries: the caller resubmits and the dedup cache
//! collapses the retry.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

use super::{ChatClient, EmbeddingClient, ServiceError, TranscriptionClient};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const TRANSCRIPTION_MODEL: &str = "whisper-1";
const EMBEDDING_MODEL: &str = "text-embedding-3-small";
const CHAT_MODEL: &str = "gpt-4.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiClient {
    /// A missing key is not an error here; calls fail with `MissingApiKey`
    /// when first used, matching startup-without-key behavior.
    pub fn new(api_key: Option<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static configuration");

        Self {
            http_client,
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    /// Same HTTP client, different credential (per-request key override)
    pub fn with_api_key(&self, api_key: String) -> Self {
        Self {
            http_client: self.http_client.clone(),
            api_key: Some(api_key),
            base_url: self.base_url.clone(),
        }
    }

    /// Point the client at a different API base (tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn key(&self) -> Result<&str, ServiceError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ServiceError::MissingApiKey)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::Api(status.as_u16(), body))
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl TranscriptionClient for OpenAiClient {
    async fn transcribe(
        &self,
        audio_path: &Path,
        filename: &str,
        mime_type: &str,
    ) -> Result<String, ServiceError> {
        let key = self.key()?.to_string();
        let audio_bytes = tokio::fs::read(audio_path).await?;
        if audio_bytes.is_empty() {
            return Err(ServiceError::EmptyInput("audio file is empty".to_string()));
        }

        tracing::debug!(
            path = %audio_path.display(),
            size_bytes = audio_bytes.len(),
            "Sending transcription request"
        );

        let part = reqwest::multipart::Part::bytes(audio_bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| ServiceError::Parse(format!("Invalid mime type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", TRANSCRIPTION_MODEL)
            .text("language", "en");

        let response = self
            .http_client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let parsed: TranscriptionResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        tracing::debug!(chars = parsed.text.len(), "Transcription successful");
        Ok(parsed.text)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let key = self.key()?.to_string();
        if texts.is_empty() {
            return Err(ServiceError::EmptyInput("no texts to embed".to_string()));
        }

        let response = self
            .http_client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(key)
            .json(&json!({
                "model": EMBEDDING_MODEL,
                "input": texts,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let parsed: EmbeddingResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(ServiceError::Parse(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ServiceError> {
        let key = self.key()?.to_string();

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(&json!({
                "model": CHAT_MODEL,
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": user_prompt },
                ],
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let parsed: ChatResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::Parse("Chat response had no content".to_string()))
    }
}
