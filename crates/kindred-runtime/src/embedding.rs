//! [`Embedder`] – text-embedding adapter.
//!
//! The semantic intent strategy only needs one capability: turn a string into
//! a vector whose cosine similarity to other vectors from the same adapter is
//! meaningful.  Exact reproducibility across calls is not required.
//!
//! [`OllamaEmbedder`] talks to a locally-running
//! [Ollama](https://ollama.com) server (`http://localhost:11434`) through its
//! `/api/embeddings` endpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use kindred_runtime::embedding::{Embedder, OllamaEmbedder};
//!
//! # async fn run() -> Result<(), kindred_runtime::embedding::EmbeddingError> {
//! let embedder = OllamaEmbedder::new("http://localhost:11434", "nomic-embed-text");
//! // Requires a running Ollama instance – skipped in unit tests.
//! let vector = embedder.embed("how do I reset my password?").await?;
//! assert!(!vector.is_empty());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use kindred_types::KindredError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from embedding generation.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response could not be interpreted as an embedding.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    /// The adapter did not answer within the configured budget.
    #[error("Embedding timed out after {0} ms")]
    Timeout(u64),
}

impl From<EmbeddingError> for KindredError {
    fn from(e: EmbeddingError) -> Self {
        KindredError::Embedding(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedder trait
// ─────────────────────────────────────────────────────────────────────────────

/// Anything that can embed text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// An async client for Ollama's `/api/embeddings` endpoint.
///
/// Construct once and share; the inner `reqwest::Client` pools connections.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    /// Create an embedder pointing at `base_url` (e.g.
    /// `"http://localhost:11434"`) and using `model` (e.g.
    /// `"nomic-embed-text"`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Http`] if the request fails, or
    /// [`EmbeddingError::BadResponse`] if the server returns no vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response: EmbeddingResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.embedding.is_empty() {
            return Err(EmbeddingError::BadResponse(format!(
                "model '{}' returned an empty embedding",
                self.model
            )));
        }
        Ok(response.embedding)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
