//! Text → fixed-length vector backends.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier stored with every index, checked on load.
    fn id(&self) -> String;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

// ── Ollama ──────────────────────────────────────────────────────────────────

/// Sentence embeddings served by a local Ollama instance (CPU is fine for
/// MiniLM-sized models).
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build embedding http client")?;
        Ok(Self {
            client,
            url: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn id(&self) -> String {
        format!("ollama:{}", self.model)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({ "model": self.model, "prompt": text });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("embedding request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("embedding model {} returned {status}: {detail}", self.model);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("invalid embedding response")?;
        if parsed.embedding.len() != self.dimensions {
            bail!(
                "embedding model {} returned {} dimensions, expected {}",
                self.model,
                parsed.embedding.len(),
                self.dimensions
            );
        }
        debug!(model = %self.model, chars = text.len(), "embedded text");
        Ok(parsed.embedding)
    }
}

// ── Feature hashing ─────────────────────────────────────────────────────────

/// Deterministic bag-of-words embedding: lowercase word and character
/// trigram features hashed into a fixed number of signed buckets, then
/// L2-normalised.  Needs no model and no network.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();
        for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            self.add_feature(&mut vector, word, 1.0);
            let chars: Vec<char> = format!("#{word}#").chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut vector, &gram, 0.5);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % self.dimensions;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn id(&self) -> String {
        format!("hashing:{}", self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_sync("Total revenue by month");
        let b = embedder.embed_sync("Total revenue by month");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn related_text_scores_higher() {
        let embedder = HashingEmbedder::new(384);
        let query = embedder.embed_sync("how many orders last month");
        let related = embedder.embed_sync("orders placed last month: 5");
        let unrelated = embedder.embed_sync("customer email addresses");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_sync("  ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn cosine_of_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn ollama_embedder_reports_transport_errors() {
        let embedder =
            OllamaEmbedder::new("http://127.0.0.1:9", "all-minilm", 384, Duration::from_millis(200))
                .unwrap();
        assert_eq!(embedder.id(), "ollama:all-minilm");
        assert!(embedder.embed("hello").await.is_err());
    }
}
