//! Memory Type Definitions
//!
//! Defines the core types shared by providers, the manager, hooks and the
//! consolidator.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::now_millis;

/// Entry type produced by consolidation unless configured otherwise
pub const SUMMARY_TYPE: &str = "summary";

/// Visibility partition of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    Agent,
    Guild,
    Global,
}

impl MemoryScope {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Guild => "guild",
            Self::Global => "global",
        }
    }
}

impl FromStr for MemoryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "guild" => Ok(Self::Guild),
            "global" => Ok(Self::Global),
            other => Err(format!("invalid scope: {}", other)),
        }
    }
}

impl fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entry visibility, ordered from most to least restrictive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Protected,
    Public,
}

impl Visibility {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Protected => "protected",
            Self::Public => "public",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "protected" => Ok(Self::Protected),
            "public" => Ok(Self::Public),
            other => Err(format!("invalid visibility: {}", other)),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stored memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    /// Creation or last-write time in milliseconds since epoch
    pub timestamp: i64,
    pub content: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    pub scope: MemoryScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Precomputed vector for the semantic provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryEntry {
    /// Create an entry with the current timestamp, agent scope and private
    /// visibility.
    pub fn new(id: impl Into<String>, entry_type: impl Into<String>, content: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            entry_type: entry_type.into(),
            timestamp: now_millis(),
            content: content.into(),
            tags: Vec::new(),
            scope: MemoryScope::Agent,
            agent_id: None,
            visibility: Visibility::Private,
            metadata: BTreeMap::new(),
            embedding: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scope(mut self, scope: MemoryScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Render the content as plain text.
    ///
    /// Strings are returned verbatim; every other shape is serialized as JSON
    /// so heterogeneous entries can share one prompt or embedding input.
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Filter specification for memory lookups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<MemoryScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    /// Match-any tag filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Text used for semantic ranking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

impl MemoryQuery {
    /// Create an unfiltered query
    pub fn new() -> Self {
        Self::default()
    }

    /// Query for a single entry by id
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, entry_type: impl Into<String>) -> Self {
        self.entry_type = Some(entry_type.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_scope(mut self, scope: MemoryScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn similar_to(mut self, text: impl Into<String>) -> Self {
        self.similarity_to = Some(text.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    pub fn limit(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Check the exact-match filters against an entry.
    ///
    /// Semantic ranking is not evaluated here.
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(ref id) = self.id {
            if &entry.id != id {
                return false;
            }
        }

        if let Some(ref entry_type) = self.entry_type {
            if &entry.entry_type != entry_type {
                return false;
            }
        }

        if let Some(ref agent_id) = self.agent_id {
            if entry.agent_id.as_ref() != Some(agent_id) {
                return false;
            }
        }

        if let Some(scope) = self.scope {
            if entry.scope != scope {
                return false;
            }
        }

        if let Some(visibility) = self.visibility {
            if entry.visibility != visibility {
                return false;
            }
        }

        if let Some(ref tags) = self.tags {
            if !tags.is_empty() && !tags.iter().any(|t| entry.tags.contains(t)) {
                return false;
            }
        }

        true
    }
}

/// Group of entries judged related enough to consolidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCluster {
    pub entries: Vec<MemoryEntry>,
    /// How tightly related the members are (0-1)
    pub coherence_score: f64,
}

impl MemoryCluster {
    pub fn new(entries: Vec<MemoryEntry>, coherence_score: f64) -> Self {
        Self {
            entries,
            coherence_score,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of the member entries, in member order
    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Union of member tags, first occurrence order
    pub fn tag_union(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.entries.iter().flat_map(|e| e.tags.iter()) {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }
}

/// Outcome of consolidating one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated_memory: Option<MemoryEntry>,
    pub source_cluster: MemoryCluster,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConsolidationResult {
    pub fn succeeded(consolidated_memory: MemoryEntry, source_cluster: MemoryCluster) -> Self {
        Self {
            success: true,
            consolidated_memory: Some(consolidated_memory),
            source_cluster,
            error: None,
        }
    }

    pub fn failed(error: impl fmt::Display, source_cluster: MemoryCluster) -> Self {
        Self {
            success: false,
            consolidated_memory: None,
            source_cluster,
            error: Some(error.to_string()),
        }
    }
}
