//! Memory Providers
//!
//! A provider is one storage backend owning a subset of entry types. All
//! variants implement [`MemoryProvider`]:
//!
//! - [`VolatileProvider`]: in-process keyed collection, no persistence
//! - [`DurableProvider`]: SQLite table, survives restarts
//! - [`SemanticProvider`]: embedding index with cosine-ranked hybrid search
//!
//! Concrete backends are chosen at construction time from a
//! [`ProviderSpec`](crate::config::ProviderSpec) via [`build_provider`].

mod durable;
mod semantic;
mod volatile;

pub mod migrations;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderSpec, SemanticConfig};
use crate::embeddings::EmbeddingProvider;
use crate::error::{MemoryError, MemoryResult};
use crate::types::{MemoryEntry, MemoryQuery};

pub use durable::DurableProvider;
pub use semantic::{ScoredEntry, SemanticProvider};
pub use volatile::VolatileProvider;

/// Storage backend contract
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Stable provider name used in errors and logs
    fn name(&self) -> &str;

    /// Whether this provider owns entries of the given type
    fn accepts_type(&self, entry_type: &str) -> bool;

    /// Upsert an entry. Atomic with respect to a single id.
    async fn store(&self, entry: MemoryEntry) -> MemoryResult<()>;

    /// Matching entries, ordered by relevance (semantic) or insertion order
    async fn query(&self, query: &MemoryQuery) -> MemoryResult<MemoryResults>;

    /// Remove an entry. Deleting a missing id is a no-op.
    async fn delete(&self, id: &str) -> MemoryResult<()>;

    /// Release backend resources. Safe to call more than once.
    async fn close(&self) -> MemoryResult<()>;
}

/// Finite, non-restartable sequence of query results.
///
/// Entries are owned copies; mutating them never touches provider state.
#[derive(Debug)]
pub struct MemoryResults {
    inner: std::vec::IntoIter<MemoryEntry>,
}

impl MemoryResults {
    pub fn new(entries: Vec<MemoryEntry>) -> Self {
        Self {
            inner: entries.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for MemoryResults {
    type Item = MemoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for MemoryResults {}

/// Set of entry types a provider owns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeOwnership {
    types: Option<Vec<String>>,
}

impl TypeOwnership {
    /// Accept every entry type
    pub fn all() -> Self {
        Self { types: None }
    }

    /// Accept only the listed types
    pub fn only<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: Some(types.into_iter().map(Into::into).collect()),
        }
    }

    pub fn accepts(&self, entry_type: &str) -> bool {
        match self.types {
            Some(ref types) => types.iter().any(|t| t == entry_type),
            None => true,
        }
    }

    /// Listed types, or `None` when every type is accepted
    pub fn types(&self) -> Option<&[String]> {
        self.types.as_deref()
    }
}

/// Construct a provider from its spec.
///
/// Semantic providers require an embedding capability and take their
/// threshold from `semantic` unless the spec sets one.
pub fn build_provider(
    spec: &ProviderSpec,
    semantic: &SemanticConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
) -> MemoryResult<Arc<dyn MemoryProvider>> {
    let provider: Arc<dyn MemoryProvider> = match spec {
        ProviderSpec::Volatile { name, types } => {
            Arc::new(VolatileProvider::new(name.clone(), types.clone()))
        }
        ProviderSpec::Durable { name, path, types } => {
            Arc::new(DurableProvider::open(name.clone(), path, types.clone())?)
        }
        ProviderSpec::Semantic {
            name,
            types,
            similarity_threshold,
        } => {
            let embedder = embedder.ok_or_else(|| {
                MemoryError::validation(format!(
                    "semantic provider '{}' requires an embedding capability",
                    name
                ))
            })?;
            let threshold = similarity_threshold.unwrap_or(semantic.similarity_threshold);
            Arc::new(SemanticProvider::new(name.clone(), types.clone(), embedder).with_threshold(threshold))
        }
    };

    tracing::debug!(provider = %provider.name(), "Provider constructed");
    Ok(provider)
}
