//! Memory Manager
//!
//! The façade callers talk to. Routes store/query/delete to the owning
//! providers, merges query results and drives the hook registry once an
//! operation has committed.
//!
//! # Routing
//!
//! - `store`: first provider, in construction order, that accepts the type
//! - `query`: providers accepting the query type, or every provider for an
//!   untyped query; results concatenate in provider order, then truncate
//! - `delete`: every provider
//!
//! # Example
//!
//! ```ignore
//! use echoforge_memory::{MemoryConfig, MemoryEntry, MemoryManager, MemoryQuery};
//!
//! let manager = MemoryManager::from_config(&MemoryConfig::default(), Some(embedder))?;
//! manager.store(MemoryEntry::new("m-1", "short-term", "ran cargo fmt")).await?;
//! let recent = manager.query(&MemoryQuery::new().with_type("short-term")).await?;
//! ```

use std::sync::Arc;

use crate::config::MemoryConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::{MemoryError, MemoryResult};
use crate::hooks::{DispatchReport, HookContext, HookRegistration, HookRegistry, MemoryHook};
use crate::providers::{build_provider, MemoryProvider};
use crate::types::{MemoryEntry, MemoryQuery};
use crate::utils::{validate_entry, validate_query};

/// Routes memory operations across an ordered provider set
pub struct MemoryManager {
    providers: Vec<Arc<dyn MemoryProvider>>,
    hooks: HookRegistry,
}

impl MemoryManager {
    /// Create a manager over providers in routing order
    pub fn new(providers: Vec<Arc<dyn MemoryProvider>>) -> Self {
        tracing::debug!(count = providers.len(), "Memory manager created");
        Self {
            providers,
            hooks: HookRegistry::new(),
        }
    }

    /// Validate a configuration and build its providers.
    ///
    /// `embedder` is required when the configuration declares a semantic
    /// provider.
    pub fn from_config(
        config: &MemoryConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> MemoryResult<Self> {
        config.validate()?;

        // Must fail before any durable file is created
        if embedder.is_none() {
            if let Some(spec) = config.providers.iter().find(|p| p.requires_embedder()) {
                return Err(MemoryError::validation(format!(
                    "semantic provider '{}' requires an embedding capability",
                    spec.name()
                )));
            }
        }

        let providers = config
            .providers
            .iter()
            .map(|spec| build_provider(spec, &config.semantic, embedder.clone()))
            .collect::<MemoryResult<Vec<_>>>()?;

        Ok(Self::new(providers))
    }

    /// Providers in routing order
    pub fn providers(&self) -> &[Arc<dyn MemoryProvider>] {
        &self.providers
    }

    /// The hook registry driven by this manager
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Store an entry in the first provider that owns its type.
    ///
    /// `onStore` hooks run after the provider commits.
    pub async fn store(&self, entry: MemoryEntry) -> MemoryResult<()> {
        validate_entry(&entry)?;

        let provider = self
            .providers
            .iter()
            .find(|p| p.accepts_type(&entry.entry_type))
            .ok_or_else(|| {
                MemoryError::validation(format!(
                    "no provider accepts entry type '{}'",
                    entry.entry_type
                ))
            })?;

        tracing::debug!(
            entry_id = %entry.id,
            entry_type = %entry.entry_type,
            provider = %provider.name(),
            "Routing store"
        );
        provider.store(entry.clone()).await?;

        self.hooks.dispatch(HookContext::for_store(entry)).await;
        Ok(())
    }

    /// Query the providers owning the query type, or all providers for an
    /// untyped query.
    ///
    /// Results are concatenated in provider order and truncated to
    /// `max_results`; there is no global re-ranking.
    pub async fn query(&self, query: &MemoryQuery) -> MemoryResult<Vec<MemoryEntry>> {
        validate_query(query)?;

        let targets = self.providers.iter().filter(|p| match query.entry_type {
            Some(ref entry_type) => p.accepts_type(entry_type),
            None => true,
        });

        let mut results = Vec::new();
        for provider in targets {
            let matched = provider.query(query).await?;
            tracing::debug!(provider = %provider.name(), count = matched.len(), "Provider query complete");
            results.extend(matched);
        }

        if let Some(max_results) = query.max_results {
            results.truncate(max_results);
        }

        self.hooks
            .dispatch(HookContext::for_query(query.clone(), results.clone()))
            .await;
        Ok(results)
    }

    /// Fetch a single entry by id
    pub async fn get(&self, id: &str) -> MemoryResult<Option<MemoryEntry>> {
        let results = self.query(&MemoryQuery::by_id(id).limit(1)).await?;
        Ok(results.into_iter().next())
    }

    /// Delete an entry from every provider.
    ///
    /// Deleting a missing id succeeds; `onDelete` hooks run either way.
    pub async fn delete(&self, id: &str) -> MemoryResult<()> {
        if id.trim().is_empty() {
            return Err(MemoryError::validation("entry id is required"));
        }

        for provider in &self.providers {
            provider.delete(id).await?;
        }

        tracing::debug!(entry_id = %id, "Delete committed");
        self.hooks.dispatch(HookContext::for_delete(id)).await;
        Ok(())
    }

    /// Register a hook, replacing any registration with the same id
    pub async fn register_hook(
        &self,
        registration: HookRegistration,
        callback: Arc<dyn MemoryHook>,
    ) -> MemoryResult<()> {
        self.hooks.register(registration, callback).await
    }

    /// Unregister a hook. Returns whether it existed.
    pub async fn unregister_hook(&self, id: &str) -> bool {
        self.hooks.unregister(id).await
    }

    pub(crate) async fn dispatch(&self, ctx: HookContext) -> DispatchReport {
        self.hooks.dispatch(ctx).await
    }

    /// Close every provider.
    ///
    /// All providers are closed even if one fails; the first error is
    /// returned.
    pub async fn close(&self) -> MemoryResult<()> {
        let mut first_error = None;

        for provider in &self.providers {
            if let Err(err) = provider.close().await {
                tracing::warn!(provider = %provider.name(), error = %err, "Failed to close provider");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSpec;
    use crate::embeddings::HashingEmbedder;
    use crate::hooks::{hook_fn, HookError, HookEvent, HookPayload};
    use crate::providers::{DurableProvider, SemanticProvider, TypeOwnership, VolatileProvider};
    use crate::testing::{KeywordEmbedder, PanickingHook};
    use serde_json::json;
    use std::sync::Mutex;

    fn three_tier() -> MemoryManager {
        MemoryManager::new(vec![
            Arc::new(VolatileProvider::new("volatile", TypeOwnership::only(["short-term", "working"]))),
            Arc::new(DurableProvider::open_in_memory("durable", TypeOwnership::only(["long-term", "summary"])).unwrap()),
            Arc::new(SemanticProvider::new(
                "semantic",
                TypeOwnership::only(["semantic"]),
                Arc::new(KeywordEmbedder::new(["launch", "budget", "hiring"])),
            )),
        ])
    }

    fn event_log() -> (Arc<Mutex<Vec<String>>>, Arc<dyn MemoryHook>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let hook = hook_fn(move |ctx| {
            let sink = sink.clone();
            async move {
                let detail = match ctx.payload {
                    HookPayload::Store { ref entry } => entry.id.clone(),
                    HookPayload::Delete { ref entry_id } => entry_id.clone(),
                    HookPayload::Query { ref results, .. } => results.len().to_string(),
                    HookPayload::Consolidate { ref result } => result.success.to_string(),
                };
                sink.lock().unwrap().push(format!("{}:{}", ctx.event, detail));
                Ok(())
            }
        });
        (log, hook)
    }

    #[tokio::test]
    async fn test_round_trip_through_every_provider() {
        let manager = three_tier();
        let entries = vec![
            MemoryEntry::new("st", "short-term", json!({"cmd": "ls"})),
            MemoryEntry::new("lt", "long-term", json!({"fact": "prod runs on arm64", "weight": 0.5})),
            MemoryEntry::new("se", "semantic", "launch retrospective").with_tags(["launch"]),
        ];

        for entry in &entries {
            manager.store(entry.clone()).await.unwrap();
        }

        for entry in &entries {
            assert_eq!(manager.get(&entry.id).await.unwrap().as_ref(), Some(entry));
        }
    }

    #[tokio::test]
    async fn test_store_routes_to_first_accepting_provider() {
        let first = Arc::new(VolatileProvider::new("first", TypeOwnership::all()));
        let second = Arc::new(VolatileProvider::new("second", TypeOwnership::all()));
        let manager = MemoryManager::new(vec![first.clone(), second.clone()]);

        manager.store(MemoryEntry::new("a", "anything", "x")).await.unwrap();
        assert_eq!(first.len().await, 1);
        assert!(second.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_without_owner_is_validation_error() {
        let manager = three_tier();
        let (log, hook) = event_log();
        manager
            .register_hook(HookRegistration::new("log", HookEvent::ALL), hook)
            .await
            .unwrap();

        let err = manager.store(MemoryEntry::new("x", "episodic", "x")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_entry_never_reaches_provider() {
        let volatile = Arc::new(VolatileProvider::new("volatile", TypeOwnership::all()));
        let manager = MemoryManager::new(vec![volatile.clone()]);

        let err = manager.store(MemoryEntry::new("", "short-term", "x")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(volatile.is_empty().await);

        let err = manager.query(&MemoryQuery::new().limit(0)).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_overwrite_is_idempotent() {
        let manager = three_tier();
        manager.store(MemoryEntry::new("a", "long-term", "v1")).await.unwrap();
        manager
            .store(MemoryEntry::new("a", "long-term", "v2").with_tags(["edited"]))
            .await
            .unwrap();

        let all = manager.query(&MemoryQuery::new().with_type("long-term")).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, json!("v2"));
        assert_eq!(all[0].tags, vec!["edited"]);
    }

    #[tokio::test]
    async fn test_typed_query_only_touches_owners() {
        let manager = three_tier();
        manager.store(MemoryEntry::new("st", "short-term", "x").with_tags(["t"])).await.unwrap();
        manager.store(MemoryEntry::new("wk", "working", "y").with_tags(["t"])).await.unwrap();
        manager.store(MemoryEntry::new("lt", "long-term", "z").with_tags(["t"])).await.unwrap();

        // Closing the durable provider makes any routed call fail
        manager.providers()[1].close().await.unwrap();

        let ids: Vec<_> = manager
            .query(&MemoryQuery::new().with_type("short-term"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["st"]);

        let err = manager.query(&MemoryQuery::new().with_tags(["t"])).await.unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_untyped_query_concatenates_in_provider_order() {
        let manager = three_tier();
        manager.store(MemoryEntry::new("lt-1", "long-term", "a")).await.unwrap();
        manager.store(MemoryEntry::new("st-1", "short-term", "b")).await.unwrap();
        manager.store(MemoryEntry::new("se-1", "semantic", "launch")).await.unwrap();
        manager.store(MemoryEntry::new("st-2", "working", "c")).await.unwrap();

        let ids: Vec<_> = manager
            .query(&MemoryQuery::new())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["st-1", "st-2", "lt-1", "se-1"]);

        let limited = manager.query(&MemoryQuery::new().limit(3)).await.unwrap();
        assert_eq!(limited.len(), 3);
        assert_eq!(limited[2].id, "lt-1");
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop_and_fans_out() {
        let manager = three_tier();
        manager.store(MemoryEntry::new("a", "short-term", "x")).await.unwrap();

        manager.delete("nonexistent").await.unwrap();
        assert!(manager.get("a").await.unwrap().is_some());

        manager.delete("a").await.unwrap();
        assert!(manager.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_then_delete_fires_hooks_in_order() {
        let manager = three_tier();
        let (log, hook) = event_log();
        manager
            .register_hook(
                HookRegistration::new("audit", [HookEvent::OnStore, HookEvent::OnDelete]),
                hook,
            )
            .await
            .unwrap();

        manager.store(MemoryEntry::new("m-1", "short-term", "x")).await.unwrap();
        manager.query(&MemoryQuery::new()).await.unwrap();
        manager.delete("m-1").await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["onStore:m-1", "onDelete:m-1"]);
    }

    #[tokio::test]
    async fn test_query_hook_sees_results() {
        let manager = three_tier();
        let (log, hook) = event_log();
        manager
            .register_hook(HookRegistration::new("q", [HookEvent::OnQuery]), hook)
            .await
            .unwrap();

        manager.store(MemoryEntry::new("a", "short-term", "x")).await.unwrap();
        manager.store(MemoryEntry::new("b", "short-term", "y")).await.unwrap();
        manager.query(&MemoryQuery::new().with_type("short-term")).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["onQuery:2"]);
    }

    #[tokio::test]
    async fn test_hook_priority_order_is_stable() {
        let manager = three_tier();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (id, priority) in [("low", 1), ("high", 10)] {
            let order = order.clone();
            manager
                .register_hook(
                    HookRegistration::new(id, [HookEvent::OnStore]).priority(priority),
                    hook_fn(move |_ctx| {
                        let order = order.clone();
                        async move {
                            order.lock().unwrap().push(id);
                            Ok(())
                        }
                    }),
                )
                .await
                .unwrap();
        }

        for i in 0..5 {
            manager
                .store(MemoryEntry::new(format!("m-{}", i), "short-term", i))
                .await
                .unwrap();
        }

        let order = order.lock().unwrap();
        assert_eq!(order.len(), 10);
        assert!(order.chunks(2).all(|pair| pair == ["high", "low"]));
    }

    #[tokio::test]
    async fn test_failing_hooks_do_not_fail_store() {
        let manager = three_tier();
        let (log, hook) = event_log();

        manager
            .register_hook(
                HookRegistration::new("broken", [HookEvent::OnStore]).priority(10),
                hook_fn(|_ctx| async { Err(HookError::new("audit sink unavailable")) }),
            )
            .await
            .unwrap();
        manager
            .register_hook(
                HookRegistration::new("panicky", [HookEvent::OnStore]).priority(5),
                Arc::new(PanickingHook),
            )
            .await
            .unwrap();
        manager
            .register_hook(HookRegistration::new("log", [HookEvent::OnStore]).priority(1), hook)
            .await
            .unwrap();

        manager.store(MemoryEntry::new("m-1", "short-term", "x")).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["onStore:m-1"]);
        assert!(manager.get("m-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_provider_failure_fires_no_hook() {
        let manager = three_tier();
        let (log, hook) = event_log();
        manager
            .register_hook(HookRegistration::new("log", HookEvent::ALL), hook)
            .await
            .unwrap();

        manager.close().await.unwrap();

        assert!(manager.store(MemoryEntry::new("a", "long-term", "x")).await.unwrap_err().is_storage());
        assert!(manager.query(&MemoryQuery::new()).await.unwrap_err().is_storage());
        assert!(manager.delete("a").await.unwrap_err().is_storage());
        assert!(log.lock().unwrap().is_empty());

        // Closing again is harmless
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unregister_hook() {
        let manager = three_tier();
        let (log, hook) = event_log();
        manager
            .register_hook(HookRegistration::new("log", [HookEvent::OnStore]), hook)
            .await
            .unwrap();

        assert!(manager.unregister_hook("log").await);
        assert!(!manager.unregister_hook("log").await);

        manager.store(MemoryEntry::new("a", "short-term", "x")).await.unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = MemoryConfig::new(vec![
            ProviderSpec::Volatile {
                name: "scratch".into(),
                types: TypeOwnership::only(["short-term"]),
            },
            ProviderSpec::Durable {
                name: "archive".into(),
                path: dir.path().join("memory.db"),
                types: TypeOwnership::all(),
            },
        ]);

        let manager = MemoryManager::from_config(&config, None).unwrap();
        let names: Vec<_> = manager.providers().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["scratch", "archive"]);

        manager.store(MemoryEntry::new("a", "episodic", "x")).await.unwrap();
        assert!(manager.get("a").await.unwrap().is_some());
        manager.close().await.unwrap();

        // The default configuration declares a semantic provider
        let err = MemoryManager::from_config(&MemoryConfig::default(), None).err().unwrap();
        assert!(err.is_validation());

        let err = MemoryManager::from_config(&MemoryConfig::new(vec![]), None).err().unwrap();
        assert!(matches!(err, MemoryError::Config(_)));

        let semantic = MemoryConfig::new(vec![ProviderSpec::Semantic {
            name: "vectors".into(),
            types: TypeOwnership::all(),
            similarity_threshold: Some(0.5),
        }]);
        assert!(MemoryManager::from_config(&semantic, Some(Arc::new(HashingEmbedder::default()))).is_ok());
    }
}
