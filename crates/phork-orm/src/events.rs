//! Named-event bus driving the model lifecycle.
//!
//! Every model instance owns an [`EventKey`] that prefixes its lifecycle
//! event names, so two models of the same type never hear each other's
//! events. Handlers run in registration order (or at an explicitly chosen
//! position) and their results merge last-write-wins.

use crate::context::AppContext;
use crate::error::{OrmError, OrmResult};
use crate::model::{ModelConfig, ModelState};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle event suffixes fired by the model
pub mod lifecycle {
    pub const PRE_LOAD: &str = "pre-load";
    pub const POST_LOAD: &str = "post-load";
    pub const PRE_SAVE: &str = "pre-save";
    pub const POST_SAVE: &str = "post-save";
    pub const PRE_DELETE: &str = "pre-delete";
    pub const POST_DELETE: &str = "post-delete";
    pub const PRE_DESTROY: &str = "pre-destroy";
    pub const POST_DESTROY: &str = "post-destroy";
}

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Per-instance event namespace, `{model name}#{serial}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    prefix: String,
}

impl EventKey {
    pub fn new(model_name: &str) -> Self {
        let serial = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
        Self {
            prefix: format!("{}#{}", model_name, serial),
        }
    }

    /// Full event name for a lifecycle suffix
    pub fn event(&self, suffix: &str) -> String {
        format!("{}.{}", self.prefix, suffix)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

/// Key/value payload handed to handlers.
///
/// A subscription carries a bound payload; per-run extras are merged over it,
/// extras winning on key collision.
#[derive(Debug, Clone, Default)]
pub struct EventPayload {
    entries: Map<String, Value>,
}

impl EventPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bound payload overlaid with per-run extras
    pub fn merged(&self, extra: &EventPayload) -> EventPayload {
        let mut entries = self.entries.clone();
        for (key, value) in &extra.entries {
            entries.insert(key.clone(), value.clone());
        }
        EventPayload { entries }
    }

    /// Name of the model operation in flight, if the run recorded one
    pub fn function(&self) -> Option<&str> {
        self.entries.get("function").and_then(Value::as_str)
    }

    /// Whether the storage step of the operation succeeded
    pub fn success(&self) -> Option<bool> {
        self.entries.get("success").and_then(Value::as_bool)
    }

    /// Whether a save inserted rather than updated
    pub fn new_record(&self) -> Option<bool> {
        self.entries.get("new_record").and_then(Value::as_bool)
    }
}

/// What a handler wants the caller to know: veto flags and an optional
/// return-value override, merged across handlers last-write-wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventResult {
    flags: Map<String, Value>,
}

impl EventResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, key: impl Into<String>, value: Value) -> Self {
        self.flags.insert(key.into(), value);
        self
    }

    /// Shorthand for a boolean veto flag such as `skip_save`
    pub fn skip(action: &str) -> Self {
        Self::new().with_flag(format!("skip_{}", action), Value::Bool(true))
    }

    /// Shorthand for overriding the operation's return value
    pub fn override_result(result: bool) -> Self {
        Self::new().with_flag("result", Value::Bool(result))
    }

    pub fn flag(&self, key: &str) -> bool {
        self.flags.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// The `result` override, when any handler set one
    pub fn result_override(&self) -> Option<bool> {
        self.flags.get("result").and_then(Value::as_bool)
    }

    pub fn merge(&mut self, other: EventResult) {
        for (key, value) in other.flags {
            self.flags.insert(key, value);
        }
    }
}

/// Per-run context handed to every handler alongside the mutable model state.
pub struct HookContext<'a> {
    pub config: &'a Arc<ModelConfig>,
    pub app: &'a AppContext,
    pub payload: &'a EventPayload,
}

/// A lifecycle hook. Handlers receive the model's mutable state and may
/// return an [`EventResult`] to veto or override the operation.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn call(
        &self,
        model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>>;
}

/// Opaque ticket for removing a single subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// A registered handler plus its bound payload, returned when unsubscribed.
#[derive(Clone)]
pub struct Subscription {
    handle: SubscriptionHandle,
    handler: Arc<dyn EventHandler>,
    bound: EventPayload,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    pub fn bound(&self) -> &EventPayload {
        &self.bound
    }
}

/// Ordered registry of handlers per event name.
#[derive(Default)]
pub struct EventBus {
    events: HashMap<String, Vec<Subscription>>,
    next_handle: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler at the end of the event's list
    pub fn register(
        &mut self,
        event: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        bound: EventPayload,
    ) -> SubscriptionHandle {
        let event = event.into();
        let at = self.events.get(&event).map_or(0, Vec::len);
        self.register_at(event, handler, bound, at)
    }

    /// Subscribe a handler at `position`, clamped to the list length.
    /// Earlier positions run first.
    pub fn register_at(
        &mut self,
        event: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        bound: EventPayload,
        position: usize,
    ) -> SubscriptionHandle {
        self.next_handle += 1;
        let handle = SubscriptionHandle(self.next_handle);
        let list = self.events.entry(event.into()).or_default();
        let position = position.min(list.len());
        list.insert(
            position,
            Subscription {
                handle,
                handler,
                bound,
            },
        );
        handle
    }

    pub fn exists(&self, event: &str) -> bool {
        self.events.get(event).is_some_and(|list| !list.is_empty())
    }

    /// Remove one subscription by handle, returning it when found
    pub fn remove(&mut self, event: &str, handle: SubscriptionHandle) -> Option<Subscription> {
        let list = self.events.get_mut(event)?;
        let at = list.iter().position(|sub| sub.handle == handle)?;
        Some(list.remove(at))
    }

    /// Drop every subscription for an event, returning them in order
    pub fn destroy(&mut self, event: &str) -> Vec<Subscription> {
        self.events.remove(event).unwrap_or_default()
    }

    /// Drop every event whose name starts with `prefix.`
    pub fn destroy_prefixed(&mut self, prefix: &str) {
        let prefix = format!("{}.", prefix);
        self.events.retain(|name, _| !name.starts_with(&prefix));
    }

    fn snapshot(&self, event: &str) -> Vec<(Arc<dyn EventHandler>, EventPayload)> {
        self.events
            .get(event)
            .map(|list| {
                list.iter()
                    .map(|sub| (Arc::clone(&sub.handler), sub.bound.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// How [`run_event`] treats missing events and finished events.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Error when nothing is subscribed instead of returning an empty result
    pub fatal_if_missing: bool,
    /// Unsubscribe everything for this event after the run
    pub cleanup_after: bool,
}

/// Run all handlers subscribed to `event` in order, merging their results.
///
/// The subscription list is snapshotted before any handler runs, so handlers
/// that mutate the bus do not affect the current run.
pub async fn run_event(
    app: &AppContext,
    config: &Arc<ModelConfig>,
    event: &str,
    model: &mut ModelState,
    extra: &EventPayload,
    opts: RunOptions,
) -> OrmResult<EventResult> {
    let snapshot = app.events.read().snapshot(event);

    if snapshot.is_empty() {
        if opts.fatal_if_missing {
            return Err(OrmError::UnknownEvent(event.to_string()));
        }
        return Ok(EventResult::new());
    }

    tracing::debug!(event, handlers = snapshot.len(), "running event");

    let mut merged = EventResult::new();
    for (handler, bound) in snapshot {
        let payload = bound.merged(extra);
        let cx = HookContext {
            config,
            app,
            payload: &payload,
        };
        if let Some(result) = handler.call(model, &cx).await? {
            merged.merge(result);
        }
    }

    if opts.cleanup_after {
        app.events.write().destroy(event);
    }

    Ok(merged)
}
