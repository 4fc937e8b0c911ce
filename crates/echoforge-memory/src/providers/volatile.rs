//! Volatile Provider
//!
//! In-process keyed collection. Nothing is persisted; entries live as long as
//! the provider does.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MemoryProvider, MemoryResults, TypeOwnership};
use crate::error::{MemoryError, MemoryResult};
use crate::types::{MemoryEntry, MemoryQuery};

#[derive(Default)]
struct VolatileState {
    /// Entries keyed by insertion sequence, so iteration is insertion order
    entries: BTreeMap<u64, MemoryEntry>,
    /// Entry id to insertion sequence
    index: HashMap<String, u64>,
    next_sequence: u64,
    closed: bool,
}

/// In-memory provider with linear predicate filtering
pub struct VolatileProvider {
    name: String,
    types: TypeOwnership,
    state: RwLock<VolatileState>,
}

impl VolatileProvider {
    /// Create a new volatile provider
    pub fn new(name: impl Into<String>, types: TypeOwnership) -> Self {
        Self {
            name: name.into(),
            types,
            state: RwLock::new(VolatileState::default()),
        }
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn closed_error(&self) -> MemoryError {
        MemoryError::storage(&self.name, "provider is closed")
    }
}

#[async_trait]
impl MemoryProvider for VolatileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_type(&self, entry_type: &str) -> bool {
        self.types.accepts(entry_type)
    }

    async fn store(&self, entry: MemoryEntry) -> MemoryResult<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(self.closed_error());
        }

        // Overwrites keep their original position
        let sequence = match state.index.get(&entry.id) {
            Some(sequence) => *sequence,
            None => {
                let sequence = state.next_sequence;
                state.next_sequence += 1;
                state.index.insert(entry.id.clone(), sequence);
                sequence
            }
        };

        tracing::debug!(provider = %self.name, entry_id = %entry.id, "Stored volatile entry");
        state.entries.insert(sequence, entry);
        Ok(())
    }

    async fn query(&self, query: &MemoryQuery) -> MemoryResult<MemoryResults> {
        let state = self.state.read().await;
        if state.closed {
            return Err(self.closed_error());
        }

        let limit = query.max_results.unwrap_or(usize::MAX);
        let matched: Vec<MemoryEntry> = state
            .entries
            .values()
            .filter(|e| query.matches(e))
            .take(limit)
            .cloned()
            .collect();

        Ok(MemoryResults::new(matched))
    }

    async fn delete(&self, id: &str) -> MemoryResult<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(self.closed_error());
        }

        if let Some(sequence) = state.index.remove(id) {
            state.entries.remove(&sequence);
            tracing::debug!(provider = %self.name, entry_id = %id, "Deleted volatile entry");
        }
        Ok(())
    }

    async fn close(&self) -> MemoryResult<()> {
        let mut state = self.state.write().await;
        if !state.closed {
            state.entries.clear();
            state.index.clear();
            state.closed = true;
        }
        Ok(())
    }
}
