//! Clustering strategies.
//!
//! A strategy partitions the candidate set into groups. The consolidator
//! applies `min_cluster_size`; strategies that score by similarity also drop
//! clusters below the similarity threshold themselves.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConsolidationOptions;
use crate::embeddings::{cosine_similarity, embed_text, EmbeddingProvider};
use crate::error::MemoryResult;
use crate::types::{MemoryCluster, MemoryEntry};

/// Slack for threshold comparisons on f32-derived scores
const SIMILARITY_EPSILON: f64 = 1e-6;

/// Partitions candidate entries into clusters.
#[async_trait]
pub trait ClusteringStrategy: Send + Sync {
    /// Strategy name, recorded on produced summaries.
    fn name(&self) -> &str;

    /// Group entries. Every returned cluster is non-empty; entries appear in
    /// at most one cluster.
    async fn cluster(
        &self,
        entries: &[MemoryEntry],
        options: &ConsolidationOptions,
    ) -> MemoryResult<Vec<MemoryCluster>>;
}

/// Greedy single-pass clustering on content embeddings.
///
/// Each entry joins the first existing cluster whose representative (its
/// first member) is at least `similarity_threshold` similar, otherwise it
/// starts a new cluster. The result depends on input order and is not a
/// globally optimal partition. Clusters whose average pairwise similarity
/// falls below the threshold are dropped.
pub struct SemanticClustering {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SemanticClustering {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    async fn vectorize(&self, entry: &MemoryEntry) -> MemoryResult<Vec<f32>> {
        match entry.embedding {
            Some(ref vector) => Ok(vector.clone()),
            None => embed_text(self.embedder.as_ref(), &entry.content_text()).await,
        }
    }
}

/// Group indices greedily against each group's first member
fn greedy_groups(vectors: &[Vec<f32>], threshold: f64) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for (index, vector) in vectors.iter().enumerate() {
        let home = groups
            .iter_mut()
            .find(|group| cosine_similarity(&vectors[group[0]], vector) + SIMILARITY_EPSILON >= threshold);

        match home {
            Some(group) => group.push(index),
            None => groups.push(vec![index]),
        }
    }

    groups
}

/// Average of a pairwise score over all member pairs. Singletons score 1.0.
fn average_pairwise<T>(members: &[T], score: impl Fn(&T, &T) -> f64) -> f64 {
    if members.len() < 2 {
        return 1.0;
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            total += score(&members[i], &members[j]);
            pairs += 1;
        }
    }

    total / pairs as f64
}

#[async_trait]
impl ClusteringStrategy for SemanticClustering {
    fn name(&self) -> &str {
        "semantic"
    }

    async fn cluster(
        &self,
        entries: &[MemoryEntry],
        options: &ConsolidationOptions,
    ) -> MemoryResult<Vec<MemoryCluster>> {
        let mut vectors = Vec::with_capacity(entries.len());
        for entry in entries {
            vectors.push(self.vectorize(entry).await?);
        }

        let threshold = options.similarity_threshold;
        let mut clusters = Vec::new();

        for group in greedy_groups(&vectors, threshold) {
            let coherence = average_pairwise(&group, |a, b| cosine_similarity(&vectors[*a], &vectors[*b]));

            if coherence + SIMILARITY_EPSILON < threshold {
                tracing::debug!(
                    size = group.len(),
                    coherence,
                    threshold,
                    "Dropping incoherent cluster"
                );
                continue;
            }

            let members = group.iter().map(|i| entries[*i].clone()).collect();
            clusters.push(MemoryCluster::new(members, coherence.clamp(0.0, 1.0)));
        }

        Ok(clusters)
    }
}

/// Groups entries by their first tag.
///
/// Coherence is the average pairwise Jaccard similarity of member tag sets.
/// Untagged entries are never clustered. No embedding capability is needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagClustering;

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[async_trait]
impl ClusteringStrategy for TagClustering {
    fn name(&self) -> &str {
        "tag"
    }

    async fn cluster(
        &self,
        entries: &[MemoryEntry],
        _options: &ConsolidationOptions,
    ) -> MemoryResult<Vec<MemoryCluster>> {
        // Keyed by first appearance so output order follows input order
        let mut order: Vec<&str> = Vec::new();
        let mut groups: BTreeMap<usize, Vec<&MemoryEntry>> = BTreeMap::new();

        for entry in entries {
            let Some(first) = entry.tags.first() else {
                continue;
            };
            let slot = match order.iter().position(|t| *t == first.as_str()) {
                Some(slot) => slot,
                None => {
                    order.push(first.as_str());
                    order.len() - 1
                }
            };
            groups.entry(slot).or_default().push(entry);
        }

        Ok(groups
            .into_values()
            .map(|members| {
                let tag_sets: Vec<HashSet<&str>> = members
                    .iter()
                    .map(|e| e.tags.iter().map(String::as_str).collect())
                    .collect();
                let coherence = average_pairwise(&tag_sets, jaccard);
                MemoryCluster::new(members.into_iter().cloned().collect(), coherence)
            })
            .collect())
    }
}
