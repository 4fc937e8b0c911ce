//! Reflexive Memory Hooks
//!
//! Observer callbacks fired by the [`MemoryManager`](crate::MemoryManager)
//! after it commits a mutation or completes a query. Hooks observe committed
//! state only; they never run before an operation or after a failed one.
//!
//! # Event Kinds
//!
//! - `onStore`: an entry was upserted - carries the entry
//! - `onQuery`: a query completed - carries the query and its results
//! - `onDelete`: an entry id was deleted - carries the id
//! - `onConsolidate`: a cluster was consolidated - carries the result
//!
//! # Ordering and Isolation
//!
//! Dispatch is sequential: higher priority first, ties in registration order.
//! A hook that returns an error or panics is logged with its registration id
//! and event kind, and dispatch continues with the next hook.
//!
//! # Example
//!
//! ```rust,no_run
//! use echoforge_memory::hooks::{hook_fn, HookEvent, HookRegistration};
//! use echoforge_memory::MemoryManager;
//!
//! async fn example(manager: &MemoryManager) -> echoforge_memory::MemoryResult<()> {
//!     let audit = hook_fn(|ctx| async move {
//!         tracing::info!(event = %ctx.event, "memory changed");
//!         Ok(())
//!     });
//!
//!     manager
//!         .register_hook(
//!             HookRegistration::new("audit", [HookEvent::OnStore, HookEvent::OnDelete]).priority(10),
//!             audit,
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::MemoryResult;
use crate::types::{ConsolidationResult, MemoryEntry, MemoryQuery};
use crate::utils::{now_millis, validate_registration};

// ─────────────────────────────────────────────────────────────────────────────
// Hook Event
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of memory event a hook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookEvent {
    OnStore,
    OnQuery,
    OnDelete,
    OnConsolidate,
}

impl HookEvent {
    /// All event kinds, in declaration order.
    pub const ALL: [HookEvent; 4] = [
        HookEvent::OnStore,
        HookEvent::OnQuery,
        HookEvent::OnDelete,
        HookEvent::OnConsolidate,
    ];
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookEvent::OnStore => write!(f, "onStore"),
            HookEvent::OnQuery => write!(f, "onQuery"),
            HookEvent::OnDelete => write!(f, "onDelete"),
            HookEvent::OnConsolidate => write!(f, "onConsolidate"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Context
// ─────────────────────────────────────────────────────────────────────────────

/// Event-specific data handed to a hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HookPayload {
    Store { entry: MemoryEntry },
    Query {
        query: MemoryQuery,
        results: Vec<MemoryEntry>,
    },
    Delete {
        #[serde(rename = "entryId")]
        entry_id: String,
    },
    Consolidate { result: ConsolidationResult },
}

impl HookPayload {
    /// Event kind this payload belongs to.
    pub fn event(&self) -> HookEvent {
        match self {
            HookPayload::Store { .. } => HookEvent::OnStore,
            HookPayload::Query { .. } => HookEvent::OnQuery,
            HookPayload::Delete { .. } => HookEvent::OnDelete,
            HookPayload::Consolidate { .. } => HookEvent::OnConsolidate,
        }
    }
}

/// Context passed to hook execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookContext {
    pub event: HookEvent,
    pub payload: HookPayload,
    /// Dispatch time in milliseconds since epoch
    pub timestamp: i64,
}

impl HookContext {
    /// Create a context stamped with the current time.
    pub fn new(payload: HookPayload) -> Self {
        Self {
            event: payload.event(),
            payload,
            timestamp: now_millis(),
        }
    }

    pub fn for_store(entry: MemoryEntry) -> Self {
        Self::new(HookPayload::Store { entry })
    }

    pub fn for_query(query: MemoryQuery, results: Vec<MemoryEntry>) -> Self {
        Self::new(HookPayload::Query { query, results })
    }

    pub fn for_delete(entry_id: impl Into<String>) -> Self {
        Self::new(HookPayload::Delete {
            entry_id: entry_id.into(),
        })
    }

    pub fn for_consolidate(result: ConsolidationResult) -> Self {
        Self::new(HookPayload::Consolidate { result })
    }

    /// Entry carried by an `onStore` context.
    pub fn entry(&self) -> Option<&MemoryEntry> {
        match &self.payload {
            HookPayload::Store { entry } => Some(entry),
            _ => None,
        }
    }

    /// Entry id carried by an `onStore` or `onDelete` context.
    pub fn entry_id(&self) -> Option<&str> {
        match &self.payload {
            HookPayload::Store { entry } => Some(entry.id.as_str()),
            HookPayload::Delete { entry_id } => Some(entry_id.as_str()),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Error / Registration
// ─────────────────────────────────────────────────────────────────────────────

/// Failure reported by a hook. Logged, never propagated to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HookError {}

/// Subscription details for one hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookRegistration {
    /// Unique within a registry
    pub id: String,
    /// Ordered set of subscribed event kinds
    pub events: Vec<HookEvent>,
    /// Higher runs first
    #[serde(default)]
    pub priority: i32,
}

impl HookRegistration {
    /// Create a registration with priority 0. Duplicate events are dropped.
    pub fn new(id: impl Into<String>, events: impl IntoIterator<Item = HookEvent>) -> Self {
        let mut unique = Vec::new();
        for event in events {
            if !unique.contains(&event) {
                unique.push(event);
            }
        }

        Self {
            id: id.into(),
            events: unique,
            priority: 0,
        }
    }

    /// Set priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Check whether this registration subscribes to an event kind.
    pub fn subscribes_to(&self, event: HookEvent) -> bool {
        self.events.contains(&event)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Callback invoked for subscribed memory events.
#[async_trait]
pub trait MemoryHook: Send + Sync {
    async fn on_event(&self, ctx: &HookContext) -> Result<(), HookError>;
}

/// Hook implementation using a closure.
pub struct FnHook<F> {
    handler: F,
}

#[async_trait]
impl<F, Fut> MemoryHook for FnHook<F>
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    async fn on_event(&self, ctx: &HookContext) -> Result<(), HookError> {
        (self.handler)(ctx.clone()).await
    }
}

/// Build a hook from an async closure receiving an owned context.
pub fn hook_fn<F, Fut>(handler: F) -> Arc<dyn MemoryHook>
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    Arc::new(FnHook { handler })
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Registry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct RegisteredHook {
    registration: HookRegistration,
    callback: Arc<dyn MemoryHook>,
    /// Registration order, used to break priority ties
    sequence: u64,
}

#[derive(Default)]
struct RegistryState {
    hooks: Vec<RegisteredHook>,
    next_sequence: u64,
}

/// Outcome counts of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Prioritized multimap from event kind to callback.
#[derive(Default)]
pub struct HookRegistry {
    state: RwLock<RegistryState>,
}

impl HookRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. An existing registration with the same id is
    /// replaced and moves to the end of the registration order.
    pub async fn register(
        &self,
        registration: HookRegistration,
        callback: Arc<dyn MemoryHook>,
    ) -> MemoryResult<()> {
        validate_registration(&registration)?;

        let mut state = self.state.write().await;
        let replaced = state.hooks.len();
        state.hooks.retain(|h| h.registration.id != registration.id);
        if state.hooks.len() != replaced {
            tracing::debug!(hook_id = %registration.id, "Replacing hook registration");
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.hooks.push(RegisteredHook {
            registration,
            callback,
            sequence,
        });

        Ok(())
    }

    /// Unregister a hook by id. Returns whether a registration existed.
    pub async fn unregister(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.hooks.len();
        state.hooks.retain(|h| h.registration.id != id);
        state.hooks.len() != before
    }

    /// Registrations subscribed to an event kind, in dispatch order.
    pub async fn registrations(&self, event: HookEvent) -> Vec<HookRegistration> {
        self.subscribers(event)
            .await
            .into_iter()
            .map(|h| h.registration)
            .collect()
    }

    /// Number of registrations.
    pub async fn len(&self) -> usize {
        self.state.read().await.hooks.len()
    }

    /// Whether the registry holds no registrations.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn subscribers(&self, event: HookEvent) -> Vec<RegisteredHook> {
        let state = self.state.read().await;
        let mut hooks: Vec<RegisteredHook> = state
            .hooks
            .iter()
            .filter(|h| h.registration.subscribes_to(event))
            .cloned()
            .collect();

        // Priority descending, then registration order
        hooks.sort_by(|a, b| {
            b.registration
                .priority
                .cmp(&a.registration.priority)
                .then(a.sequence.cmp(&b.sequence))
        });
        hooks
    }

    /// Invoke every hook subscribed to the context's event kind.
    ///
    /// The registry lock is released before callbacks run, so a hook may
    /// register or unregister hooks without deadlocking. Each callback runs
    /// on its own task so a panic is contained.
    ///
    /// # Panics
    ///
    /// Callbacks are spawned with `tokio::spawn`, so this must be awaited
    /// from within a Tokio runtime (either flavor).
    pub async fn dispatch(&self, ctx: HookContext) -> DispatchReport {
        let hooks = self.subscribers(ctx.event).await;
        let ctx = Arc::new(ctx);
        let mut report = DispatchReport::default();

        for hook in hooks {
            report.invoked += 1;

            let callback = hook.callback.clone();
            let task_ctx = ctx.clone();
            let outcome = tokio::spawn(async move { callback.on_event(&task_ctx).await }).await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.failed += 1;
                    tracing::warn!(
                        hook_id = %hook.registration.id,
                        event = %ctx.event,
                        error = %err,
                        "Memory hook failed"
                    );
                }
                Err(join_err) => {
                    report.failed += 1;
                    tracing::warn!(
                        hook_id = %hook.registration.id,
                        event = %ctx.event,
                        error = %join_err,
                        "Memory hook panicked"
                    );
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PanickingHook;
    use std::sync::Mutex;

    fn recorder(log: Arc<Mutex<Vec<String>>>, label: &'static str) -> Arc<dyn MemoryHook> {
        hook_fn(move |ctx| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("{}:{}", label, ctx.event));
                Ok(())
            }
        })
    }

    #[test]
    fn test_hook_event_display() {
        assert_eq!(HookEvent::OnStore.to_string(), "onStore");
        assert_eq!(HookEvent::OnConsolidate.to_string(), "onConsolidate");
        assert_eq!(serde_json::to_value(HookEvent::OnQuery).unwrap(), "onQuery");
    }

    #[test]
    fn test_registration_dedups_events() {
        let reg = HookRegistration::new("h", [HookEvent::OnStore, HookEvent::OnStore, HookEvent::OnDelete]);
        assert_eq!(reg.events, vec![HookEvent::OnStore, HookEvent::OnDelete]);
        assert_eq!(reg.priority, 0);
    }

    #[tokio::test]
    async fn test_dispatch_orders_by_priority_then_registration() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(HookRegistration::new("low", [HookEvent::OnStore]).priority(1), recorder(log.clone(), "low"))
            .await
            .unwrap();
        registry
            .register(HookRegistration::new("tie-a", [HookEvent::OnStore]).priority(5), recorder(log.clone(), "tie-a"))
            .await
            .unwrap();
        registry
            .register(HookRegistration::new("high", [HookEvent::OnStore]).priority(10), recorder(log.clone(), "high"))
            .await
            .unwrap();
        registry
            .register(HookRegistration::new("tie-b", [HookEvent::OnStore]).priority(5), recorder(log.clone(), "tie-b"))
            .await
            .unwrap();

        for _ in 0..3 {
            registry.dispatch(HookContext::for_delete("x")).await;
            registry
                .dispatch(HookContext::for_store(crate::MemoryEntry::new("m", "t", "c")))
                .await;
        }

        let log = log.lock().unwrap();
        let expected = ["high:onStore", "tie-a:onStore", "tie-b:onStore", "low:onStore"];
        assert_eq!(log.len(), 12);
        for run in log.chunks(4) {
            assert_eq!(run, expected);
        }
    }

    #[tokio::test]
    async fn test_failing_and_panicking_hooks_are_isolated() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(
                HookRegistration::new("broken", [HookEvent::OnDelete]).priority(20),
                hook_fn(|_ctx| async { Err(HookError::new("ledger unavailable")) }),
            )
            .await
            .unwrap();
        registry
            .register(
                HookRegistration::new("panicky", [HookEvent::OnDelete]).priority(10),
                Arc::new(PanickingHook),
            )
            .await
            .unwrap();
        registry
            .register(HookRegistration::new("healthy", [HookEvent::OnDelete]), recorder(log.clone(), "healthy"))
            .await
            .unwrap();

        let report = registry.dispatch(HookContext::for_delete("m-1")).await;
        assert_eq!(report, DispatchReport { invoked: 3, failed: 2 });
        assert_eq!(*log.lock().unwrap(), vec!["healthy:onDelete"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panic_isolation_on_multi_thread_runtime() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(
                HookRegistration::new("panicky", [HookEvent::OnQuery]).priority(1),
                Arc::new(PanickingHook),
            )
            .await
            .unwrap();
        registry
            .register(HookRegistration::new("after", [HookEvent::OnQuery]), recorder(log.clone(), "after"))
            .await
            .unwrap();

        let report = registry.dispatch(HookContext::for_delete("m-1")).await;
        assert_eq!(report, DispatchReport::default());

        let report = registry
            .dispatch(HookContext::for_query(crate::MemoryQuery::new(), Vec::new()))
            .await;
        assert_eq!(report, DispatchReport { invoked: 2, failed: 1 });
        assert_eq!(*log.lock().unwrap(), vec!["after:onQuery"]);
    }

    #[tokio::test]
    async fn test_reregister_replaces_and_unregister_reports_existence() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(HookRegistration::new("h", [HookEvent::OnStore]), recorder(log.clone(), "first"))
            .await
            .unwrap();
        registry
            .register(HookRegistration::new("h", [HookEvent::OnDelete]), recorder(log.clone(), "second"))
            .await
            .unwrap();

        assert_eq!(registry.len().await, 1);
        assert!(registry.registrations(HookEvent::OnStore).await.is_empty());

        registry.dispatch(HookContext::for_delete("m")).await;
        assert_eq!(*log.lock().unwrap(), vec!["second:onDelete"]);

        assert!(registry.unregister("h").await);
        assert!(!registry.unregister("h").await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_registration() {
        let registry = HookRegistry::new();
        let err = registry
            .register(HookRegistration::new("", [HookEvent::OnStore]), hook_fn(|_| async { Ok(()) }))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_context_accessors() {
        let ctx = HookContext::for_delete("gone");
        assert_eq!(ctx.event, HookEvent::OnDelete);
        assert_eq!(ctx.entry_id(), Some("gone"));
        assert!(ctx.entry().is_none());
    }
}
