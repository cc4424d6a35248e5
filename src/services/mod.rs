//! External collaborator clients
//!
//! The pipeline talks to its collaborators through object-safe traits so
//! tests can substitute instrumented fakes. Production wiring uses the local
//! filesystem blob store and one OpenAI-backed client implementing all three
//! AI traits.

pub mod blob_store;
pub mod openai_client;
pub mod report_generator;

pub use blob_store::{BlobStore, LocalBlobStore};
pub use openai_client::OpenAiClient;
pub use report_generator::ReportGenerator;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Collaborator call failure
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("OpenAI API key not configured")]
    MissingApiKey,

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Speech-to-text collaborator
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Transcribe the audio file at `audio_path` and return the text
    async fn transcribe(
        &self,
        audio_path: &Path,
        filename: &str,
        mime_type: &str,
    ) -> Result<String, ServiceError>;
}

/// Text embedding collaborator, used to rank transcript segments
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed each input text; returns one vector per input, in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

/// Chat completion collaborator
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, ServiceError>;
}
