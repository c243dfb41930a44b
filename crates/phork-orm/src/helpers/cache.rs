//! Load-result caching helper.
//!
//! A load's identity is its call context: the same operation with the same
//! arguments hashes to the same key. Results live in a namespace (defaulting
//! to the model's table) so any write to the model can invalidate every
//! cached load at once by bumping the namespace token.
//!
//! Cache failures degrade to a miss and a report; they never fail the load.

use crate::error::OrmResult;
use crate::events::{
    lifecycle, EventBus, EventHandler, EventKey, EventPayload, EventResult, HookContext,
};
use crate::helpers::{HelperSubscriptions, ModelHelper};
use crate::model::{CallContext, ModelState};
use crate::record::RecordSet;
use phork_cache::Cache;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What gets cached per load call
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedResult {
    records: RecordSet,
    found_rows: Option<u64>,
}

pub struct CacheHelper {
    namespace: Option<String>,
    ttl: Duration,
    missed: Arc<AtomicBool>,
    subs: HelperSubscriptions,
}

impl CacheHelper {
    pub fn new(ttl: Duration) -> Self {
        Self {
            namespace: None,
            ttl,
            missed: Arc::new(AtomicBool::new(false)),
            subs: HelperSubscriptions::new(),
        }
    }

    /// Share a namespace across models that read the same underlying data
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

fn namespace_for<'a>(configured: &'a Option<String>, table: &'a str) -> &'a str {
    configured.as_deref().unwrap_or(table)
}

fn cache_key(table: &str, call: &CallContext) -> OrmResult<String> {
    let serialized = serde_json::to_vec(call)?;
    Ok(format!(
        "model:{}:{}",
        table,
        hex::encode(blake3::hash(&serialized).as_bytes())
    ))
}

impl ModelHelper for CacheHelper {
    fn name(&self) -> &str {
        "cache"
    }

    fn init(&mut self, bus: &mut EventBus, key: &EventKey) -> OrmResult<()> {
        self.subs.subscribe(
            bus,
            key.event(lifecycle::PRE_LOAD),
            Arc::new(LookupHook {
                namespace: self.namespace.clone(),
                missed: Arc::clone(&self.missed),
            }),
            EventPayload::new(),
        );
        self.subs.subscribe(
            bus,
            key.event(lifecycle::POST_LOAD),
            Arc::new(StoreHook {
                namespace: self.namespace.clone(),
                ttl: self.ttl,
                missed: Arc::clone(&self.missed),
            }),
            EventPayload::new(),
        );
        for write_event in [
            lifecycle::POST_SAVE,
            lifecycle::POST_DELETE,
            lifecycle::POST_DESTROY,
        ] {
            self.subs.subscribe(
                bus,
                key.event(write_event),
                Arc::new(InvalidateHook {
                    namespace: self.namespace.clone(),
                }),
                EventPayload::new(),
            );
        }
        Ok(())
    }

    fn destroy(&mut self, bus: &mut EventBus) {
        self.subs.unsubscribe_all(bus);
    }
}

struct LookupHook {
    namespace: Option<String>,
    missed: Arc<AtomicBool>,
}

#[async_trait]
impl EventHandler for LookupHook {
    async fn call(
        &self,
        model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>> {
        let Some(cache) = cache_of(cx) else {
            return Ok(None);
        };
        let Some(call) = model.call() else {
            return Ok(None);
        };
        let namespace = namespace_for(&self.namespace, &cx.config.table);
        let key = cache_key(&cx.config.table, call)?;

        match cache.get_ns::<CachedResult>(namespace, &key).await {
            Ok(Some(hit)) => {
                self.missed.store(false, Ordering::SeqCst);
                model.records = hit.records;
                model.found_rows = hit.found_rows;
                tracing::debug!(key = %key, "load served from cache");
                Ok(Some(
                    EventResult::skip("load").with_flag("result", serde_json::json!(true)),
                ))
            }
            Ok(None) => {
                self.missed.store(true, Ordering::SeqCst);
                Ok(None)
            }
            Err(error) => {
                cx.app
                    .errors
                    .report(format!("cache lookup failed for {}: {}", key, error));
                self.missed.store(true, Ordering::SeqCst);
                Ok(None)
            }
        }
    }
}

struct StoreHook {
    namespace: Option<String>,
    ttl: Duration,
    missed: Arc<AtomicBool>,
}

#[async_trait]
impl EventHandler for StoreHook {
    async fn call(
        &self,
        model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>> {
        // Store only after a genuine miss, and only when the load worked.
        if !self.missed.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        if cx.payload.success() != Some(true) {
            return Ok(None);
        }
        let Some(cache) = cache_of(cx) else {
            return Ok(None);
        };
        let Some(call) = model.call() else {
            return Ok(None);
        };
        let namespace = namespace_for(&self.namespace, &cx.config.table).to_string();
        let key = cache_key(&cx.config.table, call)?;
        let value = CachedResult {
            records: model.records.clone(),
            found_rows: model.found_rows,
        };

        if let Err(error) = cache.put_ns(&namespace, &key, &value, self.ttl).await {
            cx.app
                .errors
                .report(format!("cache store failed for {}: {}", key, error));
        }
        Ok(None)
    }
}

struct InvalidateHook {
    namespace: Option<String>,
}

#[async_trait]
impl EventHandler for InvalidateHook {
    async fn call(
        &self,
        _model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>> {
        let Some(cache) = cache_of(cx) else {
            return Ok(None);
        };
        let namespace = namespace_for(&self.namespace, &cx.config.table);
        if let Err(error) = cache.flush_ns(namespace).await {
            cx.app
                .errors
                .report(format!("cache invalidation failed for {}: {}", namespace, error));
        }
        Ok(None)
    }
}

fn cache_of<'a>(cx: &'a HookContext<'_>) -> Option<&'a Cache> {
    cx.app.cache.as_ref()
}
