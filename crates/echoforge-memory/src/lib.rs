//! EchoForge Memory - Agent Memory Subsystem
//!
//! Multi-backend store for typed memory records, with heterogeneous lookups,
//! reflexive event hooks and a consolidation engine that folds related
//! memories into summaries.
//!
//! # Modules
//!
//! - **providers** - Storage backends: volatile, durable (SQLite), semantic
//! - **manager** - Routes operations to providers and drives hooks
//! - **hooks** - Prioritized, failure-isolated observer callbacks
//! - **consolidation** - Cluster, summarize and store related memories
//! - **embeddings** - Embedding capability and cosine similarity
//! - **config** - Provider set and consolidation policy, loadable from TOML
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use echoforge_memory::embeddings::HashingEmbedder;
//! use echoforge_memory::{MemoryConfig, MemoryEntry, MemoryManager, MemoryQuery};
//!
//! async fn example() -> echoforge_memory::MemoryResult<()> {
//!     let manager = MemoryManager::from_config(
//!         &MemoryConfig::default(),
//!         Some(Arc::new(HashingEmbedder::default())),
//!     )?;
//!
//!     // Short-term entries land in the volatile provider
//!     manager
//!         .store(MemoryEntry::new("m-1", "short-term", "User ran `git status`").with_tags(["git"]))
//!         .await?;
//!
//!     let recent = manager.query(&MemoryQuery::new().with_tags(["git"])).await?;
//!     assert_eq!(recent.len(), 1);
//!
//!     manager.close().await
//! }
//! ```

pub mod config;
pub mod consolidation;
pub mod embeddings;
pub mod hooks;
pub mod manager;
pub mod providers;
pub mod types;
pub mod utils;

mod error;

#[cfg(test)]
mod testing;

pub use config::{ConfigValidationError, ConsolidationOptions, MemoryConfig, ProviderSpec, SemanticConfig};
pub use consolidation::{
    ClusteringStrategy, ConcatenationSummarization, MemoryConsolidator, PromptSummarization,
    SemanticClustering, SummarizationStrategy, Summarizer, TagClustering,
};
pub use embeddings::{EmbeddingProvider, HashingEmbedder};
pub use error::{MemoryError, MemoryResult};
pub use hooks::{hook_fn, HookContext, HookError, HookEvent, HookPayload, HookRegistration, HookRegistry, MemoryHook};
pub use manager::MemoryManager;
pub use providers::{
    DurableProvider, MemoryProvider, MemoryResults, ScoredEntry, SemanticProvider, TypeOwnership,
    VolatileProvider,
};
pub use types::{
    ConsolidationResult, MemoryCluster, MemoryEntry, MemoryQuery, MemoryScope, Visibility, SUMMARY_TYPE,
};

#[cfg(feature = "fastembed")]
pub use embeddings::FastEmbedder;
