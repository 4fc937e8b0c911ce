//! Memory Consolidation
//!
//! Batch pipeline on top of the [`MemoryManager`]:
//!
//! 1. Fetch candidates with a query (existing summaries are skipped unless
//!    `include_consolidated` is set)
//! 2. Cluster them with a [`ClusteringStrategy`]
//! 3. Drop clusters that are too small, too old, or contain private entries
//!    when the policy excludes them, and clusters whose members an existing
//!    summary already lists in `consolidatedFrom`
//! 4. Summarize each cluster with a [`SummarizationStrategy`]
//! 5. Store the summary, fire `onConsolidate`, and optionally delete sources
//!
//! A failure while summarizing or storing one cluster is recorded in its
//! result and the batch continues. The consolidator keeps no state between
//! calls.

mod clustering;
mod summarization;

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::config::ConsolidationOptions;
use crate::error::MemoryResult;
use crate::hooks::HookContext;
use crate::manager::MemoryManager;
use crate::types::{ConsolidationResult, MemoryCluster, MemoryEntry, MemoryQuery, Visibility};
use crate::utils::now_millis;

pub use clustering::{ClusteringStrategy, SemanticClustering, TagClustering};
pub use summarization::{
    build_prompt, summary_entry, ConcatenationSummarization, PromptSummarization,
    SummarizationStrategy, Summarizer,
};

/// Clusters related memories and replaces them with summaries
pub struct MemoryConsolidator {
    manager: Arc<MemoryManager>,
    clustering: Arc<dyn ClusteringStrategy>,
    summarization: Arc<dyn SummarizationStrategy>,
}

impl MemoryConsolidator {
    pub fn new(
        manager: Arc<MemoryManager>,
        clustering: Arc<dyn ClusteringStrategy>,
        summarization: Arc<dyn SummarizationStrategy>,
    ) -> Self {
        Self {
            manager,
            clustering,
            summarization,
        }
    }

    /// Run one consolidation batch over the entries matching `query`.
    ///
    /// Returns one result per cluster that passed the policy filters.
    /// Fetch and clustering errors fail the whole call.
    pub async fn consolidate(
        &self,
        query: &MemoryQuery,
        options: &ConsolidationOptions,
    ) -> MemoryResult<Vec<ConsolidationResult>> {
        options.validate()?;

        let mut candidates = self.manager.query(query).await?;
        if !options.include_consolidated {
            candidates.retain(|e| e.entry_type != options.consolidated_memory_type);
        }

        let clusters = self.clustering.cluster(&candidates, options).await?;
        let total_clusters = clusters.len();
        let now = now_millis();

        let covered = self.summarized_sources(options).await?;
        let mut already_summarized = 0;

        let qualifying: Vec<MemoryCluster> = clusters
            .into_iter()
            .filter(|c| c.len() >= options.min_cluster_size)
            .filter(|c| passes_policy(c, options, now))
            .filter(|c| {
                let fresh = !is_covered(c, &covered);
                if !fresh {
                    already_summarized += 1;
                }
                fresh
            })
            .collect();

        tracing::debug!(
            candidates = candidates.len(),
            clusters = total_clusters,
            already_summarized,
            qualifying = qualifying.len(),
            strategy = %self.clustering.name(),
            "Clustering complete"
        );

        let mut results = Vec::with_capacity(qualifying.len());
        for cluster in qualifying {
            results.push(self.consolidate_cluster(cluster, options).await);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        tracing::info!(
            succeeded,
            failed = results.len() - succeeded,
            "Consolidation batch complete"
        );

        Ok(results)
    }

    /// Source id sets of every stored summary
    async fn summarized_sources(&self, options: &ConsolidationOptions) -> MemoryResult<Vec<HashSet<String>>> {
        let summaries = self
            .manager
            .query(&MemoryQuery::new().with_type(options.consolidated_memory_type.clone()))
            .await?;

        Ok(summaries.iter().filter_map(consolidated_from).collect())
    }

    async fn consolidate_cluster(
        &self,
        cluster: MemoryCluster,
        options: &ConsolidationOptions,
    ) -> ConsolidationResult {
        let summary = match self.summarization.summarize(&cluster, options).await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(
                    members = cluster.len(),
                    error = %err,
                    "Cluster summarization failed"
                );
                return ConsolidationResult::failed(err, cluster);
            }
        };

        if let Err(err) = self.manager.store(summary.clone()).await {
            tracing::warn!(summary_id = %summary.id, error = %err, "Failed to store summary");
            return ConsolidationResult::failed(err, cluster);
        }

        if !options.retain_sources {
            for source in &cluster.entries {
                if let Err(err) = self.manager.delete(&source.id).await {
                    tracing::warn!(entry_id = %source.id, error = %err, "Failed to prune consolidated source");
                }
            }
        }

        let result = ConsolidationResult::succeeded(summary, cluster);
        self.manager
            .dispatch(HookContext::for_consolidate(result.clone()))
            .await;
        result
    }
}

fn consolidated_from(summary: &MemoryEntry) -> Option<HashSet<String>> {
    match summary.metadata.get("consolidatedFrom") {
        Some(Value::Array(ids)) => Some(ids.iter().filter_map(|id| id.as_str().map(str::to_string)).collect()),
        _ => None,
    }
}

/// Whether one existing summary already lists every member of `cluster`
fn is_covered(cluster: &MemoryCluster, covered: &[HashSet<String>]) -> bool {
    covered
        .iter()
        .any(|sources| cluster.entries.iter().all(|e| sources.contains(&e.id)))
}

/// Age and visibility policy for a qualifying cluster
fn passes_policy(cluster: &MemoryCluster, options: &ConsolidationOptions, now: i64) -> bool {
    if let Some(max_age) = options.max_memory_age {
        let cutoff = now - max_age;
        if cluster.entries.iter().all(|e| e.timestamp < cutoff) {
            return false;
        }
    }

    if !options.include_private && cluster.entries.iter().any(|e| e.visibility == Visibility::Private) {
        return false;
    }

    true
}
