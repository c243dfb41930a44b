//! Denormalized-count maintenance helper.
//!
//! Keeps a count column on a parent table in step with the child rows this
//! model manages, without one storage write per change: deltas accumulate in
//! the cache and are flushed in batches, and an occasional full resync
//! recomputes the true count from the source table so drift never survives
//! for long. With the cache disabled every change writes through directly.

use crate::context::AppContext;
use crate::error::OrmResult;
use crate::events::{
    lifecycle, EventBus, EventHandler, EventKey, EventPayload, EventResult, HookContext,
};
use crate::helpers::{HelperSubscriptions, ModelHelper};
use crate::model::ModelState;
use crate::query::Query;
use crate::record::RecordId;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CounterConfig {
    /// Table carrying the count column
    pub target_table: String,
    pub target_primary_key: String,
    pub count_column: String,
    /// Column on this model's rows naming the parent
    pub foreign_key: String,
    /// Percent chance per change that the true count is recomputed
    pub sync_frequency: u32,
    /// Flush the buffered delta once it is a multiple of this
    pub update_frequency: i64,
    pub use_cache: bool,
    pub ttl: Duration,
}

impl CounterConfig {
    pub fn new(
        target_table: impl Into<String>,
        count_column: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            target_table: target_table.into(),
            target_primary_key: "id".to_string(),
            count_column: count_column.into(),
            foreign_key: foreign_key.into(),
            sync_frequency: 1,
            update_frequency: 1,
            use_cache: true,
            ttl: Duration::from_secs(3600),
        }
    }

    pub fn target_primary_key(mut self, column: impl Into<String>) -> Self {
        self.target_primary_key = column.into();
        self
    }

    pub fn sync_frequency(mut self, percent: u32) -> Self {
        self.sync_frequency = percent;
        self
    }

    pub fn update_frequency(mut self, every: i64) -> Self {
        self.update_frequency = every;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    fn delta_key(&self, parent: RecordId) -> String {
        format!(
            "counter:{}:{}:{}",
            self.target_table, self.count_column, parent
        )
    }
}

pub struct CounterHelper {
    config: Arc<CounterConfig>,
    pending_parents: Arc<Mutex<Vec<RecordId>>>,
    subs: HelperSubscriptions,
}

impl CounterHelper {
    pub fn new(config: CounterConfig) -> Self {
        Self {
            config: Arc::new(config),
            pending_parents: Arc::new(Mutex::new(Vec::new())),
            subs: HelperSubscriptions::new(),
        }
    }
}

impl ModelHelper for CounterHelper {
    fn name(&self) -> &str {
        "counter"
    }

    fn init(&mut self, bus: &mut EventBus, key: &EventKey) -> OrmResult<()> {
        self.subs.subscribe(
            bus,
            key.event(lifecycle::POST_SAVE),
            Arc::new(IncrementHook {
                config: Arc::clone(&self.config),
            }),
            EventPayload::new(),
        );
        // Parent ids must be captured before the rows vanish.
        for snapshot_event in [lifecycle::PRE_DELETE, lifecycle::PRE_DESTROY] {
            self.subs.subscribe(
                bus,
                key.event(snapshot_event),
                Arc::new(SnapshotHook {
                    config: Arc::clone(&self.config),
                    pending_parents: Arc::clone(&self.pending_parents),
                }),
                EventPayload::new(),
            );
        }
        for decrement_event in [lifecycle::POST_DELETE, lifecycle::POST_DESTROY] {
            self.subs.subscribe(
                bus,
                key.event(decrement_event),
                Arc::new(DecrementHook {
                    config: Arc::clone(&self.config),
                    pending_parents: Arc::clone(&self.pending_parents),
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

/// Apply a count change for one parent, buffering through the cache when
/// enabled. Infrastructure failures are reported, never raised.
async fn change_count(
    app: &AppContext,
    source_table: &str,
    config: &CounterConfig,
    parent: RecordId,
    delta: i64,
) -> OrmResult<()> {
    let cache = match app.cache.as_ref() {
        Some(cache) if config.use_cache => cache,
        _ => {
            let query = Query::new().eq(&config.target_primary_key, json!(parent));
            if let Err(error) = app
                .storage
                .adjust(&config.target_table, &config.count_column, delta, &query)
                .await
            {
                app.errors
                    .report(format!("counter update failed for {}: {}", parent, error));
            }
            return Ok(());
        }
    };

    let delta_key = config.delta_key(parent);
    let guard_key = format!("{}:sync", delta_key);

    let drew_sync = rand::thread_rng().gen_range(0u32..100) < config.sync_frequency;
    let guard_pending = match cache.exists(&guard_key).await {
        Ok(pending) => pending,
        Err(error) => {
            app.errors
                .report(format!("counter guard check failed: {}", error));
            false
        }
    };
    if drew_sync || guard_pending {
        return sync_count(app, source_table, config, parent).await;
    }

    let pending = match cache.increment(&delta_key, delta, true).await {
        Ok(pending) => pending.unwrap_or(delta),
        Err(error) => {
            app.errors
                .report(format!("counter buffering failed: {}", error));
            // The lost delta makes the buffer untrustworthy; force a full
            // resync on the next change.
            if let Err(error) = cache.add_marker(&guard_key, Some(config.ttl)).await {
                app.errors
                    .report(format!("counter guard set failed: {}", error));
            }
            return Ok(());
        }
    };

    // A buffered delta of zero means increments and decrements cancelled
    // out; resyncing now is cheap and clears the key.
    if pending == 0 {
        return sync_count(app, source_table, config, parent).await;
    }

    if pending % config.update_frequency.max(1) == 0 {
        let query = Query::new().eq(&config.target_primary_key, json!(parent));
        match app
            .storage
            .adjust(&config.target_table, &config.count_column, pending, &query)
            .await
        {
            Ok(_) => {
                if let Err(error) = cache.increment(&delta_key, -pending, false).await {
                    app.errors
                        .report(format!("counter flush bookkeeping failed: {}", error));
                }
            }
            Err(error) => {
                app.errors
                    .report(format!("counter flush failed for {}: {}", parent, error));
                // Force a resync on the next change instead of retrying here.
                if let Err(error) = cache.add_marker(&guard_key, Some(config.ttl)).await {
                    app.errors
                        .report(format!("counter guard set failed: {}", error));
                }
            }
        }
    }
    Ok(())
}

/// Recompute the true count from the source table and write it through,
/// clearing the buffered delta and any pending-sync guard.
async fn sync_count(
    app: &AppContext,
    source_table: &str,
    config: &CounterConfig,
    parent: RecordId,
) -> OrmResult<()> {
    let count_query = Query::new().eq(&config.foreign_key, json!(parent));
    let true_count = match app.storage.count(source_table, &count_query).await {
        Ok(count) => count,
        Err(error) => {
            app.errors
                .report(format!("counter resync count failed: {}", error));
            return Ok(());
        }
    };

    let query = Query::new().eq(&config.target_primary_key, json!(parent));
    let values = [(config.count_column.clone(), json!(true_count))]
        .into_iter()
        .collect();
    match app.storage.update(&config.target_table, values, &query).await {
        Ok(_) => {
            if let Some(cache) = &app.cache {
                let delta_key = config.delta_key(parent);
                let guard_key = format!("{}:sync", delta_key);
                for key in [delta_key, guard_key] {
                    if let Err(error) = cache.forget(&key).await {
                        app.errors
                            .report(format!("counter resync cleanup failed: {}", error));
                    }
                }
            }
        }
        Err(error) => {
            app.errors
                .report(format!("counter resync write failed: {}", error));
            if let Some(cache) = &app.cache {
                let guard_key = format!("{}:sync", config.delta_key(parent));
                if let Err(error) = cache.add_marker(&guard_key, Some(config.ttl)).await {
                    app.errors
                        .report(format!("counter guard set failed: {}", error));
                }
            }
        }
    }
    Ok(())
}

struct IncrementHook {
    config: Arc<CounterConfig>,
}

#[async_trait]
impl EventHandler for IncrementHook {
    async fn call(
        &self,
        model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>> {
        if cx.payload.success() != Some(true) || cx.payload.new_record() != Some(true) {
            return Ok(None);
        }
        let parent = model
            .records
            .current()
            .and_then(|record| record.attr(&self.config.foreign_key).as_i64());
        if let Some(parent) = parent {
            change_count(cx.app, &cx.config.table, &self.config, parent, 1).await?;
        }
        Ok(None)
    }
}

struct SnapshotHook {
    config: Arc<CounterConfig>,
    pending_parents: Arc<Mutex<Vec<RecordId>>>,
}

#[async_trait]
impl EventHandler for SnapshotHook {
    async fn call(
        &self,
        model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>> {
        let mut parents = Vec::new();
        match cx.payload.function() {
            Some("destroy") => {
                if let Some(parent) = model
                    .records
                    .current()
                    .and_then(|record| record.attr(&self.config.foreign_key).as_i64())
                {
                    parents.push(parent);
                }
            }
            _ => {
                let query = match cx.payload.get("params") {
                    Some(params) => serde_json::from_value::<Query>(params.clone())?,
                    None => return Ok(None),
                };
                // The delete applies conditions only; snapshot the same set,
                // not the paginated view.
                let query = Query {
                    conditions: query.conditions,
                    ..Query::default()
                };
                match cx.app.storage.select(&cx.config.table, &query).await {
                    Ok(rows) => {
                        parents.extend(rows.iter().filter_map(|row| {
                            row.get(&self.config.foreign_key).and_then(|v| v.as_i64())
                        }));
                    }
                    Err(error) => {
                        cx.app
                            .errors
                            .report(format!("counter snapshot failed: {}", error));
                    }
                }
            }
        }
        self.pending_parents.lock().extend(parents);
        Ok(None)
    }
}

struct DecrementHook {
    config: Arc<CounterConfig>,
    pending_parents: Arc<Mutex<Vec<RecordId>>>,
}

#[async_trait]
impl EventHandler for DecrementHook {
    async fn call(
        &self,
        _model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>> {
        let parents: Vec<RecordId> = self.pending_parents.lock().drain(..).collect();
        if cx.payload.success() != Some(true) {
            return Ok(None);
        }
        let mut per_parent: BTreeMap<RecordId, i64> = BTreeMap::new();
        for parent in parents {
            *per_parent.entry(parent).or_default() -= 1;
        }
        for (parent, delta) in per_parent {
            change_count(cx.app, &cx.config.table, &self.config, parent, delta).await?;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, ModelConfig};
    use crate::record::Record;
    use crate::storage::{MemoryStorage, Storage};
    use phork_cache::{Cache, CacheConfig, MemoryBackend};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn comment_config() -> Arc<ModelConfig> {
        Arc::new(
            ModelConfig::new("comment", "comments")
                .primary_key("comment_id")
                .columns(&["blog_id", "body"]),
        )
    }

    fn counter(sync: u32, update: i64, use_cache: bool) -> CounterConfig {
        CounterConfig::new("blogs", "comment_count", "blog_id")
            .target_primary_key("blog_id")
            .sync_frequency(sync)
            .update_frequency(update)
            .use_cache(use_cache)
    }

    async fn setup(with_cache: bool) -> (AppContext, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let mut app = AppContext::new(storage.clone());
        if with_cache {
            app = app.with_cache(Cache::new(MemoryBackend::new(CacheConfig::default())));
        }
        // One parent row to count against.
        storage
            .insert(
                "blogs",
                "blog_id",
                [
                    ("blog_id".to_string(), json!(1)),
                    ("comment_count".to_string(), json!(0)),
                ]
                .into_iter()
                .collect(),
            )
            .await
            .unwrap();
        (app, storage)
    }

    fn comment_model(app: &AppContext, config: CounterConfig) -> Model {
        let mut model = Model::new(comment_config(), app.clone());
        model
            .attach_helper(Box::new(CounterHelper::new(config)))
            .unwrap();
        model
    }

    async fn add_comment(model: &mut Model) {
        let mut record = Record::new();
        record.set("blog_id", json!(1));
        record.set("body", json!("..."));
        model.import(record);
        assert!(model.save(false).await.unwrap());
    }

    fn parent_count(storage: &MemoryStorage) -> i64 {
        storage.rows("blogs")[0]["comment_count"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_direct_mode_counts_every_change() {
        let (app, storage) = setup(false).await;
        let mut model = comment_model(&app, counter(0, 1, false));

        add_comment(&mut model).await;
        add_comment(&mut model).await;
        assert_eq!(parent_count(&storage), 2);

        assert!(model.destroy().await.unwrap());
        assert_eq!(parent_count(&storage), 1);
    }

    #[tokio::test]
    async fn test_buffered_deltas_flush_at_update_frequency() {
        let (app, storage) = setup(true).await;
        let mut model = comment_model(&app, counter(0, 10, true));

        for _ in 0..9 {
            add_comment(&mut model).await;
        }
        // Nine pending changes, none written through yet.
        assert_eq!(parent_count(&storage), 0);

        add_comment(&mut model).await;
        assert_eq!(parent_count(&storage), 10);

        // The buffer was drained; the next nine stay pending again.
        for _ in 0..9 {
            add_comment(&mut model).await;
        }
        assert_eq!(parent_count(&storage), 10);
    }

    #[tokio::test]
    async fn test_full_sync_frequency_is_always_exact() {
        let (app, storage) = setup(true).await;
        let mut model = comment_model(&app, counter(100, 1000, true));

        for expected in 1..=5 {
            add_comment(&mut model).await;
            assert_eq!(parent_count(&storage), expected);
        }
    }

    #[tokio::test]
    async fn test_bulk_delete_decrements_per_row() {
        let (app, storage) = setup(true).await;
        let mut model = comment_model(&app, counter(0, 1, true));

        for _ in 0..3 {
            add_comment(&mut model).await;
        }
        assert_eq!(parent_count(&storage), 3);

        assert!(model
            .delete(Query::new().eq("blog_id", json!(1)))
            .await
            .unwrap());
        assert_eq!(parent_count(&storage), 0);
    }

    struct FlakyCounters {
        inner: MemoryBackend,
        broken: Arc<AtomicBool>,
    }

    impl FlakyCounters {
        fn new(broken: Arc<AtomicBool>) -> Self {
            Self {
                inner: MemoryBackend::default(),
                broken,
            }
        }
    }

    #[async_trait]
    impl phork_cache::CacheBackend for FlakyCounters {
        async fn get(&self, key: &str) -> phork_cache::CacheResult<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &str,
            value: Vec<u8>,
            ttl: Option<Duration>,
        ) -> phork_cache::CacheResult<()> {
            self.inner.put(key, value, ttl).await
        }

        async fn forget(&self, key: &str) -> phork_cache::CacheResult<bool> {
            self.inner.forget(key).await
        }

        async fn exists(&self, key: &str) -> phork_cache::CacheResult<bool> {
            self.inner.exists(key).await
        }

        async fn flush(&self) -> phork_cache::CacheResult<()> {
            self.inner.flush().await
        }

        async fn increment(
            &self,
            key: &str,
            delta: i64,
            create_missing: bool,
        ) -> phork_cache::CacheResult<Option<i64>> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(phork_cache::CacheError::Backend("counters down".into()));
            }
            self.inner.increment(key, delta, create_missing).await
        }

        async fn add(
            &self,
            key: &str,
            value: Vec<u8>,
            ttl: Option<Duration>,
        ) -> phork_cache::CacheResult<bool> {
            self.inner.add(key, value, ttl).await
        }
    }

    #[tokio::test]
    async fn test_failed_buffering_forces_resync_on_recovery() {
        let storage = Arc::new(MemoryStorage::new());
        let broken = Arc::new(AtomicBool::new(false));
        let cache = Cache::new(FlakyCounters::new(Arc::clone(&broken)));
        let app = AppContext::new(storage.clone()).with_cache(cache.clone());
        storage
            .insert(
                "blogs",
                "blog_id",
                [
                    ("blog_id".to_string(), json!(1)),
                    ("comment_count".to_string(), json!(0)),
                ]
                .into_iter()
                .collect(),
            )
            .await
            .unwrap();

        let mut model = comment_model(&app, counter(0, 10, true));

        // The delta is lost during the outage, but the failure arms the
        // resync guard.
        broken.store(true, Ordering::SeqCst);
        add_comment(&mut model).await;
        assert_eq!(parent_count(&storage), 0);
        let guard = "counter:blogs:comment_count:1:sync";
        assert!(cache.exists(guard).await.unwrap());
        assert!(!app.errors.is_empty());

        // The next change sees the guard and recounts from the source table.
        broken.store(false, Ordering::SeqCst);
        add_comment(&mut model).await;
        assert_eq!(parent_count(&storage), 2);
        assert!(!cache.exists(guard).await.unwrap());
    }

    #[tokio::test]
    async fn test_paginated_delete_query_decrements_every_removed_row() {
        let (app, storage) = setup(true).await;
        let mut model = comment_model(&app, counter(0, 1, true));

        for _ in 0..3 {
            add_comment(&mut model).await;
        }
        assert_eq!(parent_count(&storage), 3);

        // The delete honors conditions only; a limit on the query must not
        // shrink the snapshot of parents to decrement.
        assert!(model
            .delete(Query::new().eq("blog_id", json!(1)).limit(1))
            .await
            .unwrap());
        assert!(storage.rows("comments").is_empty());
        assert_eq!(parent_count(&storage), 0);
    }

    #[tokio::test]
    async fn test_drift_stays_within_update_frequency() {
        let (app, storage) = setup(true).await;
        let mut model = comment_model(&app, counter(0, 10, true));

        for total in 1..=35 {
            add_comment(&mut model).await;
            let written = parent_count(&storage);
            assert!((total - written).abs() < 10, "drift {} at {}", total - written, total);
        }
    }
}
