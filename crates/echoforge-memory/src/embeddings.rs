//! Embedding Capability
//!
//! The semantic provider and the semantic clustering strategy consume
//! embeddings through the [`EmbeddingProvider`] trait. Implementations are
//! black boxes returning `anyhow::Result`; this module converts their failures
//! into [`MemoryError::Capability`] so a broken model never degrades into a
//! silent zero vector.
//!
//! # Implementations
//!
//! - [`HashingEmbedder`]: deterministic feature-hashing bag-of-words, no model
//! - `FastEmbedder` (feature `fastembed`): local all-MiniLM-L6-v2 inference
//!
//! # Usage
//!
//! ```ignore
//! use echoforge_memory::embeddings::{HashingEmbedder, cosine_similarity, embed_text};
//!
//! let embedder = HashingEmbedder::default();
//! let a = embed_text(&embedder, "launch checklist").await?;
//! let b = embed_text(&embedder, "launch plan").await?;
//! let similarity = cosine_similarity(&a, &b);
//! ```

use async_trait::async_trait;

use crate::error::{MemoryError, MemoryResult};
use crate::utils::content_hash;

/// Embedding dimensions for all-MiniLM-L6-v2
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// External capability converting text into a fixed-length vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Embed text and type the failure.
///
/// An empty vector is treated as a capability failure as well.
pub async fn embed_text(embedder: &dyn EmbeddingProvider, text: &str) -> MemoryResult<Vec<f32>> {
    let vector = embedder
        .embed(text)
        .await
        .map_err(|e| MemoryError::embedding(format!("failed to generate embedding: {:#}", e)))?;

    if vector.is_empty() {
        return Err(MemoryError::embedding("embedding capability returned an empty vector"));
    }

    Ok(vector)
}

/// Compute cosine similarity between two vectors
///
/// Returns a value between -1.0 and 1.0, where 1.0 means identical,
/// 0.0 means orthogonal, and -1.0 means opposite. Mismatched dimensions and
/// zero vectors yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Deterministic bag-of-words embedder using feature hashing.
///
/// Each lowercase alphanumeric token is hashed with SHA-256 into one of
/// `dimensions` buckets with a sign taken from the digest, and the result is
/// L2-normalized. Texts sharing vocabulary land close together, which is
/// enough for offline clustering and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Create an embedder with the given number of dimensions
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Get embedding dimensions
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());

        for token in tokens {
            let digest = content_hash(token);
            // First 8 hex chars pick the bucket, the next one picks the sign
            let bucket = u64::from_str_radix(&digest[..8], 16).unwrap_or(0) as usize % self.dimensions;
            let sign = if u8::from_str_radix(&digest[8..9], 16).unwrap_or(0) % 2 == 0 {
                1.0
            } else {
                -1.0
            };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if text.trim().is_empty() {
            anyhow::bail!("cannot embed empty text");
        }
        Ok(self.vectorize(text))
    }
}

/// Local embedding model (all-MiniLM-L6-v2) loaded on first use
#[cfg(feature = "fastembed")]
pub struct FastEmbedder {
    model: std::sync::Arc<tokio::sync::RwLock<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "fastembed")]
impl Default for FastEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "fastembed")]
impl FastEmbedder {
    /// Create a new embedder; the model is loaded lazily
    pub fn new() -> Self {
        Self {
            model: std::sync::Arc::new(tokio::sync::RwLock::new(None)),
        }
    }

    async fn ensure_model(&self) -> anyhow::Result<()> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let model_guard = self.model.read().await;
        if model_guard.is_some() {
            return Ok(());
        }
        drop(model_guard);

        let mut model_guard = self.model.write().await;
        if model_guard.is_some() {
            return Ok(());
        }

        tracing::info!("Loading embedding model: all-MiniLM-L6-v2");
        let start = std::time::Instant::now();

        let mut init_options = InitOptions::default();
        init_options.model_name = EmbeddingModel::AllMiniLML6V2;
        init_options.show_download_progress = false;

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| anyhow::anyhow!("failed to load embedding model: {}", e))?;

        tracing::info!(elapsed = ?start.elapsed(), "Embedding model loaded");

        *model_guard = Some(model);
        Ok(())
    }

    /// Check if the model is loaded
    pub async fn is_loaded(&self) -> bool {
        self.model.read().await.is_some()
    }
}

#[cfg(feature = "fastembed")]
#[async_trait]
impl EmbeddingProvider for FastEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.ensure_model().await?;

        let model_guard = self.model.read().await;
        let model = model_guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("embedding model not initialized"))?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| anyhow::anyhow!("failed to generate embedding: {}", e))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no embedding generated"))
    }
}
