use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors raised by vectorizer backends.
///
/// Always recoverable from the point of view of a sync run: the failing item is recorded and
/// the run moves on.
#[derive(Debug, Error)]
pub enum VectorizationError {
    /// Provider was unable to produce a vector for the supplied input.
    #[error("Failed to generate embedding: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned a vector of the wrong size.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured on the server.
        expected: usize,
        /// Dimension returned by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait Vectorizer: Send + Sync {
    /// Produce an embedding vector for `content`.
    async fn vectorize(&self, content: &str) -> Result<Vec<f32>, VectorizationError>;
}

/// Deterministic offline vectorizer that folds bytes into a normalized vector.
pub struct HashingVectorizer {
    dimension: usize,
}

impl HashingVectorizer {
    /// Construct a vectorizer emitting vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl Vectorizer for HashingVectorizer {
    async fn vectorize(&self, content: &str) -> Result<Vec<f32>, VectorizationError> {
        if self.dimension == 0 {
            return Err(VectorizationError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if content.trim().is_empty() {
            return Err(VectorizationError::GenerationFailed(
                "no content provided".to_string(),
            ));
        }

        Ok(Self::encode(content, self.dimension))
    }
}

/// Vectorizer backed by the Ollama embeddings endpoint.
pub struct OllamaVectorizer {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaVectorizer {
    /// Build a client targeting `base_url`.
    pub fn new(
        base_url: String,
        model: String,
        dimension: usize,
    ) -> Result<Self, VectorizationError> {
        let http = Client::builder()
            .user_agent("rusty-cache/embeddings")
            .build()
            .map_err(|error| VectorizationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Vectorizer for OllamaVectorizer {
    async fn vectorize(&self, content: &str) -> Result<Vec<f32>, VectorizationError> {
        let payload = json!({
            "model": self.model,
            "prompt": content,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                VectorizationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(VectorizationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorizationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbeddingResponse = response.json().await.map_err(|error| {
            VectorizationError::GenerationFailed(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if body.embedding.len() != self.dimension {
            return Err(VectorizationError::DimensionMismatch {
                expected: self.dimension,
                actual: body.embedding.len(),
            });
        }

        Ok(body.embedding)
    }
}

/// Build a vectorizer suitable for the current configuration.
pub fn get_vectorizer(config: &Config) -> Result<Arc<dyn Vectorizer>, VectorizationError> {
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Initializing vectorizer"
    );
    match config.embedding_provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingVectorizer::new(
            config.embedding_dimension,
        ))),
        EmbeddingProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Ok(Arc::new(OllamaVectorizer::new(
                base_url,
                config.embedding_model.clone(),
                config.embedding_dimension,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn hashing_vectorizer_is_deterministic_and_normalized() {
        let vectorizer = HashingVectorizer::new(8);
        let first = vectorizer.vectorize("hello world").await.expect("vector");
        let second = vectorizer.vectorize("hello world").await.expect("vector");
        assert_eq!(first, second);
        assert_eq!(first.len(), 8);
        let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hashing_vectorizer_rejects_blank_content() {
        let vectorizer = HashingVectorizer::new(8);
        let error = vectorizer.vectorize("   ").await.expect_err("blank content");
        assert!(matches!(error, VectorizationError::GenerationFailed(_)));
    }

    fn ollama(server: &MockServer, dimension: usize) -> OllamaVectorizer {
        OllamaVectorizer::new(server.base_url(), "nomic-embed-text".into(), dimension)
            .expect("client")
    }

    #[tokio::test]
    async fn ollama_vectorizer_returns_embedding() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embeddings")
                    .body_contains("nomic-embed-text");
                then.status(200)
                    .json_body(json!({ "embedding": [0.1, 0.2, 0.3] }));
            })
            .await;

        let vector = ollama(&server, 3).vectorize("doc").await.expect("vector");
        mock.assert();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn ollama_vectorizer_reports_dimension_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embeddings");
                then.status(200).json_body(json!({ "embedding": [0.1] }));
            })
            .await;

        let error = ollama(&server, 3).vectorize("doc").await.expect_err("mismatch");
        assert!(matches!(
            error,
            VectorizationError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn ollama_vectorizer_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embeddings");
                then.status(500).body("boom");
            })
            .await;

        let error = ollama(&server, 3).vectorize("doc").await.expect_err("error");
        assert!(
            matches!(error, VectorizationError::GenerationFailed(ref message) if message.contains("500"))
        );
    }
}
