//! Deterministic stub capabilities shared by the unit tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinSet;

use crate::consolidation::Summarizer;
use crate::embeddings::EmbeddingProvider;
use crate::hooks::{HookContext, HookError, MemoryHook};
use crate::providers::MemoryProvider;
use crate::types::{MemoryEntry, MemoryQuery};

/// Embedder that always fails
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding model offline")
    }
}

/// Embedder counting occurrences of a fixed vocabulary, one dimension per
/// keyword. Texts without any keyword map to the zero vector.
pub struct KeywordEmbedder {
    keywords: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|t| !t.is_empty())
            .collect();

        Ok(self
            .keywords
            .iter()
            .map(|k| tokens.iter().filter(|t| **t == k.as_str()).count() as f32)
            .collect())
    }
}

/// Hook that panics on every event
pub struct PanickingHook;

#[async_trait]
impl MemoryHook for PanickingHook {
    async fn on_event(&self, _ctx: &HookContext) -> Result<(), HookError> {
        panic!("hook exploded")
    }
}

/// Summarizer returning a canned response and recording every prompt
#[derive(Default)]
pub struct RecordingSummarizer {
    pub prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Summarizer for RecordingSummarizer {
    async fn summarize(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Consolidated summary".to_string())
    }
}

/// Summarizer that always fails
pub struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("language model rate limited")
    }
}

/// Id every contending writer targets
pub const CONTENDED_ID: &str = "contended";

/// Entry whose every field identifies `writer`
pub fn contended_entry(writer: usize) -> MemoryEntry {
    MemoryEntry::new(
        CONTENDED_ID,
        "long-term",
        json!({"writer": writer, "note": format!("written by {}", writer)}),
    )
    .with_tags([format!("writer-{}", writer)])
    .with_agent(format!("agent-{}", writer))
    .with_metadata("writer", json!(writer))
    .with_timestamp(1_700_000_000_000 + writer as i64)
    .with_embedding(vec![writer as f32 + 1.0, 1.0])
}

/// Race `writers` stores of [`contended_entry`], spread across `providers`
pub async fn store_concurrently(providers: &[Arc<dyn MemoryProvider>], writers: usize) {
    let mut tasks = JoinSet::new();
    for writer in 0..writers {
        let provider = providers[writer % providers.len()].clone();
        tasks.spawn(async move { provider.store(contended_entry(writer)).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }
}

/// Exactly one record survives and it is one writer's entry, unmixed
pub async fn assert_single_writer(provider: &dyn MemoryProvider) {
    let read: Vec<_> = provider.query(&MemoryQuery::new()).await.unwrap().collect();
    assert_eq!(read.len(), 1);

    let winner = read[0].metadata["writer"].as_u64().unwrap() as usize;
    assert_eq!(read[0], contended_entry(winner));
}
