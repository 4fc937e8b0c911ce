//! Semantic Provider
//!
//! Embedding index with hybrid search: exact filters narrow the candidates,
//! cosine similarity against the query text ranks them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{MemoryProvider, MemoryResults, TypeOwnership};
use crate::embeddings::{cosine_similarity, embed_text, EmbeddingProvider};
use crate::error::{MemoryError, MemoryResult};
use crate::types::{MemoryEntry, MemoryQuery};

/// Default similarity threshold when the query carries none
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Slack applied to the threshold comparison so scores that print as the
/// threshold are not lost to f32 rounding
const SIMILARITY_EPSILON: f64 = 1e-6;

/// Entry with its similarity to the query text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: MemoryEntry,
    pub similarity: f64,
}

struct IndexedEntry {
    entry: MemoryEntry,
    vector: Vec<f32>,
}

#[derive(Default)]
struct SemanticIndex {
    entries: BTreeMap<u64, IndexedEntry>,
    index: HashMap<String, u64>,
    next_sequence: u64,
    dimensions: Option<usize>,
    closed: bool,
}

/// Vector-indexed provider
pub struct SemanticProvider {
    name: String,
    types: TypeOwnership,
    embedder: Arc<dyn EmbeddingProvider>,
    threshold: f64,
    state: RwLock<SemanticIndex>,
}

impl SemanticProvider {
    pub fn new(
        name: impl Into<String>,
        types: TypeOwnership,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            types,
            embedder,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            state: RwLock::new(SemanticIndex::default()),
        }
    }

    /// Set the default similarity threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of indexed entries
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn closed_error(&self) -> MemoryError {
        MemoryError::storage(&self.name, "provider is closed")
    }

    /// Ranked hybrid search.
    ///
    /// Without `similarity_to` every pre-filtered entry is returned in
    /// insertion order with a similarity of 1.0.
    pub async fn search(&self, query: &MemoryQuery) -> MemoryResult<Vec<ScoredEntry>> {
        // Embed before taking the lock; the capability call may be slow
        let query_vector = match query.similarity_to {
            Some(ref text) => Some(embed_text(self.embedder.as_ref(), text).await?),
            None => None,
        };

        let state = self.state.read().await;
        if state.closed {
            return Err(self.closed_error());
        }

        let limit = query.max_results.unwrap_or(usize::MAX);
        let candidates = state.entries.values().filter(|indexed| query.matches(&indexed.entry));

        let Some(query_vector) = query_vector else {
            return Ok(candidates
                .take(limit)
                .map(|indexed| ScoredEntry {
                    entry: indexed.entry.clone(),
                    similarity: 1.0,
                })
                .collect());
        };

        if let Some(dimensions) = state.dimensions {
            if dimensions != query_vector.len() {
                return Err(MemoryError::embedding(format!(
                    "query embedding has {} dimensions, index has {}",
                    query_vector.len(),
                    dimensions
                )));
            }
        }

        let threshold = query.similarity_threshold.unwrap_or(self.threshold);
        let mut scored: Vec<ScoredEntry> = candidates
            .filter_map(|indexed| {
                let similarity = cosine_similarity(&query_vector, &indexed.vector);
                (similarity + SIMILARITY_EPSILON >= threshold).then(|| ScoredEntry {
                    entry: indexed.entry.clone(),
                    similarity,
                })
            })
            .collect();

        // Stable sort keeps insertion order between equal scores
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(limit);

        tracing::debug!(
            provider = %self.name,
            threshold,
            count = scored.len(),
            "Semantic search complete"
        );
        Ok(scored)
    }
}

#[async_trait]
impl MemoryProvider for SemanticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_type(&self, entry_type: &str) -> bool {
        self.types.accepts(entry_type)
    }

    async fn store(&self, entry: MemoryEntry) -> MemoryResult<()> {
        let vector = match entry.embedding {
            Some(ref vector) => vector.clone(),
            None => embed_text(self.embedder.as_ref(), &entry.content_text()).await?,
        };

        let mut state = self.state.write().await;
        if state.closed {
            return Err(self.closed_error());
        }

        match state.dimensions {
            Some(dimensions) if dimensions != vector.len() => {
                return Err(MemoryError::embedding(format!(
                    "entry '{}' embedding has {} dimensions, index has {}",
                    entry.id,
                    vector.len(),
                    dimensions
                )));
            }
            Some(_) => {}
            None => state.dimensions = Some(vector.len()),
        }

        let sequence = match state.index.get(&entry.id) {
            Some(sequence) => *sequence,
            None => {
                let sequence = state.next_sequence;
                state.next_sequence += 1;
                state.index.insert(entry.id.clone(), sequence);
                sequence
            }
        };

        tracing::debug!(provider = %self.name, entry_id = %entry.id, "Indexed semantic entry");
        state.entries.insert(sequence, IndexedEntry { entry, vector });
        Ok(())
    }

    async fn query(&self, query: &MemoryQuery) -> MemoryResult<MemoryResults> {
        let scored = self.search(query).await?;
        Ok(MemoryResults::new(scored.into_iter().map(|s| s.entry).collect()))
    }

    async fn delete(&self, id: &str) -> MemoryResult<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(self.closed_error());
        }

        if let Some(sequence) = state.index.remove(id) {
            state.entries.remove(&sequence);
            if state.entries.is_empty() {
                state.dimensions = None;
            }
            tracing::debug!(provider = %self.name, entry_id = %id, "Removed semantic entry");
        }
        Ok(())
    }

    async fn close(&self) -> MemoryResult<()> {
        let mut state = self.state.write().await;
        if !state.closed {
            state.entries.clear();
            state.index.clear();
            state.dimensions = None;
            state.closed = true;
        }
        Ok(())
    }
}
