//! Summarization strategies.
//!
//! Turn a qualifying cluster into one consolidated entry. Member content is
//! rendered to text first, so clusters may mix objects, strings and numbers.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::ConsolidationOptions;
use crate::error::{MemoryError, MemoryResult};
use crate::types::{MemoryCluster, MemoryEntry};
use crate::utils::{content_fingerprint, millis_to_datetime, now_millis};

/// Separator between merged member texts
const MERGE_SEPARATOR: &str = "\n\n---\n\n";

/// External language capability: prompt in, text out.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Produces the consolidated entry for a cluster.
#[async_trait]
pub trait SummarizationStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(
        &self,
        cluster: &MemoryCluster,
        options: &ConsolidationOptions,
    ) -> MemoryResult<MemoryEntry>;
}

/// Build the consolidated entry around synthesized content.
///
/// The summary takes the most restrictive scope and visibility of its
/// sources, keeps the agent only when every source shares it, and records
/// the source ids and coherence in metadata.
pub fn summary_entry(
    cluster: &MemoryCluster,
    content: impl Into<Value>,
    strategy: &str,
    options: &ConsolidationOptions,
) -> MemoryEntry {
    let mut entry = MemoryEntry::new(
        format!("summary-{}", Uuid::new_v4()),
        options.consolidated_memory_type.clone(),
        content,
    )
    .with_tags(cluster.tag_union())
    .with_metadata("consolidatedFrom", json!(cluster.entry_ids()))
    .with_metadata("coherenceScore", json!(cluster.coherence_score))
    .with_metadata("strategy", json!(strategy));

    if let Some(scope) = cluster.entries.iter().map(|e| e.scope).min() {
        entry = entry.with_scope(scope);
    }
    if let Some(visibility) = cluster.entries.iter().map(|e| e.visibility).min() {
        entry = entry.with_visibility(visibility);
    }

    let mut agents = cluster.entries.iter().map(|e| e.agent_id.as_deref());
    if let Some(Some(first)) = agents.next() {
        if agents.all(|a| a == Some(first)) {
            entry = entry.with_agent(first);
        }
    }

    entry
}

/// Render up to `max_entries` members into a summarization prompt
pub fn build_prompt(cluster: &MemoryCluster, max_entries: usize) -> String {
    let shown = cluster.entries.len().min(max_entries);

    let mut prompt = format!(
        "Summarize the following {} related memories into one concise memory. \
         Keep concrete facts, decisions and dates; drop repetition.\n\n",
        cluster.entries.len()
    );

    for entry in cluster.entries.iter().take(shown) {
        let when = millis_to_datetime(entry.timestamp)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| entry.timestamp.to_string());

        prompt.push_str(&format!("- [{}] ({})", when, entry.entry_type));
        if !entry.tags.is_empty() {
            prompt.push_str(&format!(" tags: {}", entry.tags.join(", ")));
        }
        prompt.push_str(&format!("\n  {}\n", entry.content_text()));
    }

    if cluster.entries.len() > shown {
        prompt.push_str(&format!(
            "\n({} additional memories omitted)\n",
            cluster.entries.len() - shown
        ));
    }

    prompt.push_str("\nSummary:");
    prompt
}

/// Summarizes through an external [`Summarizer`] with a bounded prompt.
pub struct PromptSummarization {
    summarizer: Arc<dyn Summarizer>,
}

impl PromptSummarization {
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self { summarizer }
    }
}

#[async_trait]
impl SummarizationStrategy for PromptSummarization {
    fn name(&self) -> &str {
        "prompt"
    }

    async fn summarize(
        &self,
        cluster: &MemoryCluster,
        options: &ConsolidationOptions,
    ) -> MemoryResult<MemoryEntry> {
        let prompt = build_prompt(cluster, options.max_entries_in_prompt);

        let started = now_millis();
        let summary = self
            .summarizer
            .summarize(&prompt)
            .await
            .map_err(|e| MemoryError::summarization(format!("{:#}", e)))?;

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(MemoryError::summarization("summarizer returned an empty summary"));
        }

        tracing::debug!(
            members = cluster.len(),
            prompt_chars = prompt.len(),
            elapsed_ms = now_millis() - started,
            "Cluster summarized"
        );
        Ok(summary_entry(cluster, summary, self.name(), options))
    }
}

/// Merges member text without a language model.
///
/// Identical texts (by content hash) are kept once; the rest are joined in
/// member order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatenationSummarization;

#[async_trait]
impl SummarizationStrategy for ConcatenationSummarization {
    fn name(&self) -> &str {
        "concatenation"
    }

    async fn summarize(
        &self,
        cluster: &MemoryCluster,
        options: &ConsolidationOptions,
    ) -> MemoryResult<MemoryEntry> {
        let mut seen = HashSet::new();
        let mut parts = Vec::new();

        for entry in cluster.entries.iter().take(options.max_entries_in_prompt) {
            if seen.insert(content_fingerprint(entry)) {
                parts.push(entry.content_text());
            }
        }

        if parts.is_empty() {
            return Err(MemoryError::summarization("cluster has no content to merge"));
        }

        Ok(summary_entry(cluster, parts.join(MERGE_SEPARATOR), self.name(), options))
    }
}
