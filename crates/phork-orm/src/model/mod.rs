//! The model: a record collection plus the lifecycle operations over it.
//!
//! Every operation is bracketed by a pre/post event pair on this instance's
//! [`EventKey`] namespace. Pre handlers can veto the storage step and
//! override the returned value; post handlers observe the outcome. Storage
//! failures are reported to the error channel and surface as `Ok(false)`,
//! never as `Err` — only misconfiguration is fatal.

mod config;

pub use config::{CallContext, ModelConfig};

use crate::context::AppContext;
use crate::error::{OrmError, OrmResult};
use crate::events::{lifecycle, run_event, EventKey, EventPayload, EventResult, RunOptions};
use crate::helpers::ModelHelper;
use crate::query::Query;
use crate::record::{Record, RecordId, RecordSet};
use serde_json::{json, Value};
use std::sync::Arc;

/// Mutable model state handed to event handlers.
#[derive(Debug, Default)]
pub struct ModelState {
    pub records: RecordSet,
    pub found_rows: Option<u64>,
    call: Option<CallContext>,
}

impl ModelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a call context unless one is already active. Returns whether this
    /// call owns the context; nested calls inherit the outer one.
    pub fn begin_call(&mut self, function: &str, args: Value) -> bool {
        if self.call.is_some() {
            return false;
        }
        self.call = Some(CallContext::new(function, args));
        true
    }

    pub fn end_call(&mut self) {
        self.call = None;
    }

    /// The operation currently in flight, outermost call's context
    pub fn call(&self) -> Option<&CallContext> {
        self.call.as_ref()
    }
}

pub struct Model {
    config: Arc<ModelConfig>,
    key: EventKey,
    state: ModelState,
    helpers: Vec<Box<dyn ModelHelper>>,
    ctx: AppContext,
}

impl Model {
    pub fn new(config: Arc<ModelConfig>, ctx: AppContext) -> Self {
        let key = EventKey::new(&config.name);
        Self {
            config,
            key,
            state: ModelState::new(),
            helpers: Vec::new(),
            ctx,
        }
    }

    pub fn config(&self) -> &Arc<ModelConfig> {
        &self.config
    }

    pub fn key(&self) -> &EventKey {
        &self.key
    }

    pub fn ctx(&self) -> &AppContext {
        &self.ctx
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    pub fn records(&self) -> &RecordSet {
        &self.state.records
    }

    pub fn records_mut(&mut self) -> &mut RecordSet {
        &mut self.state.records
    }

    /// Total matching rows from the last load that asked for a count
    pub fn found_rows(&self) -> Option<u64> {
        self.state.found_rows
    }

    pub fn current(&self) -> Option<&Record> {
        self.state.records.current()
    }

    pub fn current_mut(&mut self) -> Option<&mut Record> {
        self.state.records.current_mut()
    }

    /// Append a fresh record and position the cursor on it
    pub fn import(&mut self, record: Record) {
        self.state.records.append(record);
        let last = self.state.records.count() - 1;
        self.state.records.seek(last);
    }

    /// A bare sibling: same configuration and services, fresh event
    /// namespace, empty state, no helpers. Helpers use this for auxiliary
    /// queries without re-triggering their own hooks.
    pub fn fork(&self) -> Model {
        Model::new(Arc::clone(&self.config), self.ctx.clone())
    }

    /// Attach a helper, subscribing its hooks. Helper names are unique per
    /// model.
    pub fn attach_helper(&mut self, mut helper: Box<dyn ModelHelper>) -> OrmResult<()> {
        if self.helpers.iter().any(|h| h.name() == helper.name()) {
            return Err(OrmError::Configuration(format!(
                "helper '{}' already attached to {}",
                helper.name(),
                self.key
            )));
        }
        helper.init(&mut self.ctx.events.write(), &self.key)?;
        self.helpers.push(helper);
        Ok(())
    }

    /// Detach a helper by name, removing its subscriptions
    pub fn detach_helper(&mut self, name: &str) -> bool {
        let Some(index) = self.helpers.iter().position(|h| h.name() == name) else {
            return false;
        };
        let mut helper = self.helpers.remove(index);
        helper.destroy(&mut self.ctx.events.write());
        true
    }

    pub fn helper_names(&self) -> Vec<&str> {
        self.helpers.iter().map(|h| h.name()).collect()
    }

    async fn fire(
        &mut self,
        suffix: &str,
        extra: &EventPayload,
    ) -> OrmResult<EventResult> {
        run_event(
            &self.ctx,
            &self.config,
            &self.key.event(suffix),
            &mut self.state,
            extra,
            RunOptions::default(),
        )
        .await
    }

    /// Load records matching the query into the collection.
    ///
    /// Returns whether the storage read succeeded (or whatever a handler's
    /// `result` override says). A `skip_load` veto leaves the collection
    /// untouched by this method; the vetoing handler typically installed its
    /// own records.
    pub async fn load(&mut self, query: Query) -> OrmResult<bool> {
        let owns_call = self
            .state
            .begin_call("load", serde_json::to_value(&query)?);

        let extra = EventPayload::new()
            .with("function", json!("load"))
            .with("params", serde_json::to_value(&query)?);

        let mut merged = self.fire(lifecycle::PRE_LOAD, &extra).await?;
        let mut success = false;

        if !merged.flag("skip_load") {
            match self.ctx.storage.select(&self.config.table, &query).await {
                Ok(rows) => {
                    self.state.records.clear();
                    for row in rows {
                        let mut record = Record::from_row(row);
                        record.set_id(record.attr(&self.config.primary_key).as_i64());
                        self.state.records.append(record);
                    }
                    self.state.found_rows = if query.count_total {
                        let count_query = Query {
                            limit: None,
                            offset: None,
                            ..query.clone()
                        };
                        match self.ctx.storage.count(&self.config.table, &count_query).await {
                            Ok(total) => Some(total),
                            Err(error) => {
                                self.ctx.errors.report(format!(
                                    "{}: count failed: {}",
                                    self.key, error
                                ));
                                None
                            }
                        }
                    } else {
                        None
                    };
                    success = true;
                }
                Err(error) => {
                    self.ctx
                        .errors
                        .report(format!("{}: load failed: {}", self.key, error));
                }
            }
        } else {
            // A vetoed load succeeded if the vetoing handler says it did.
            success = merged.result_override().unwrap_or(false);
        }

        let post_extra = extra.with("success", json!(success));
        merged.merge(self.fire(lifecycle::POST_LOAD, &post_extra).await?);

        if owns_call {
            self.state.end_call();
        }
        Ok(merged.result_override().unwrap_or(success))
    }

    /// Persist the current record: insert when it has no identity (or
    /// `force_insert` is set), update otherwise.
    pub async fn save(&mut self, force_insert: bool) -> OrmResult<bool> {
        if self.state.records.current().is_none() {
            self.ctx
                .errors
                .report(format!("{}: save with no current record", self.key));
            return Ok(false);
        }

        let owns_call = self
            .state
            .begin_call("save", json!({ "force_insert": force_insert }));

        // Reconcile identity with the primary-key attribute before anything
        // inspects the record.
        let primary_key = self.config.primary_key.clone();
        if let Some(record) = self.state.records.current_mut() {
            match record.id() {
                Some(id) => record.set(primary_key.clone(), json!(id)),
                None => record.set_id(record.attr(&primary_key).as_i64()),
            }
        }

        let new_record = force_insert
            || self
                .state
                .records
                .current()
                .and_then(Record::id)
                .is_none();

        let extra = EventPayload::new()
            .with("function", json!("save"))
            .with("new_record", json!(new_record))
            .with("force_insert", json!(force_insert));

        let mut merged = self.fire(lifecycle::PRE_SAVE, &extra).await?;
        let mut success = false;

        if !merged.flag("skip_save") {
            success = if new_record {
                self.insert_current(force_insert).await?
            } else {
                self.update_current().await?
            };
        } else {
            success = merged.result_override().unwrap_or(false);
        }

        let post_extra = extra.with("success", json!(success));
        merged.merge(self.fire(lifecycle::POST_SAVE, &post_extra).await?);

        if owns_call {
            self.state.end_call();
        }
        Ok(merged.result_override().unwrap_or(success))
    }

    async fn insert_current(&mut self, force_insert: bool) -> OrmResult<bool> {
        if self.config.insert_columns.is_empty() {
            return Err(OrmError::Configuration(format!(
                "model '{}' has no insert columns",
                self.config.name
            )));
        }
        let record = match self.state.records.current() {
            Some(record) => record,
            None => return Ok(false),
        };
        let mut values = record.columns(&self.config.insert_columns);
        if force_insert {
            if let Some(id) = record.id() {
                values.insert(self.config.primary_key.clone(), json!(id));
            }
        }

        match self
            .ctx
            .storage
            .insert(&self.config.table, &self.config.primary_key, values)
            .await
        {
            Ok(id) => {
                let primary_key = self.config.primary_key.clone();
                if let Some(record) = self.state.records.current_mut() {
                    record.set_id(Some(id));
                    record.set(primary_key, json!(id));
                }
                Ok(true)
            }
            Err(error) => {
                self.ctx
                    .errors
                    .report(format!("{}: insert failed: {}", self.key, error));
                Ok(false)
            }
        }
    }

    async fn update_current(&mut self) -> OrmResult<bool> {
        if self.config.update_columns.is_empty() {
            return Err(OrmError::Configuration(format!(
                "model '{}' has no update columns",
                self.config.name
            )));
        }
        let record = match self.state.records.current() {
            Some(record) => record,
            None => return Ok(false),
        };
        let id = match record.id() {
            Some(id) => id,
            None => return Ok(false),
        };
        let values = record.columns(&self.config.update_columns);
        let query = Query::new().eq(&self.config.primary_key, json!(id));

        match self.ctx.storage.update(&self.config.table, values, &query).await {
            Ok(_) => Ok(true),
            Err(error) => {
                self.ctx
                    .errors
                    .report(format!("{}: update failed: {}", self.key, error));
                Ok(false)
            }
        }
    }

    /// Delete every row matching the query.
    pub async fn delete(&mut self, query: Query) -> OrmResult<bool> {
        let owns_call = self
            .state
            .begin_call("delete", serde_json::to_value(&query)?);

        let extra = EventPayload::new()
            .with("function", json!("delete"))
            .with("params", serde_json::to_value(&query)?);

        let mut merged = self.fire(lifecycle::PRE_DELETE, &extra).await?;
        let mut success = false;

        if !merged.flag("skip_delete") {
            match self.ctx.storage.delete(&self.config.table, &query).await {
                Ok(_) => success = true,
                Err(error) => {
                    self.ctx
                        .errors
                        .report(format!("{}: delete failed: {}", self.key, error));
                }
            }
        } else {
            success = merged.result_override().unwrap_or(false);
        }

        let post_extra = extra.with("success", json!(success));
        merged.merge(self.fire(lifecycle::POST_DELETE, &post_extra).await?);

        if owns_call {
            self.state.end_call();
        }
        Ok(merged.result_override().unwrap_or(success))
    }

    /// Delete rows by primary-key value
    pub async fn delete_by_id(&mut self, ids: &[RecordId]) -> OrmResult<bool> {
        if ids.is_empty() {
            return Ok(false);
        }
        let query = if ids.len() == 1 {
            Query::new().eq(&self.config.primary_key, json!(ids[0]))
        } else {
            Query::new().within(
                &self.config.primary_key,
                ids.iter().map(|id| json!(id)).collect(),
            )
        };
        self.delete(query).await
    }

    /// Delete the current record by its identity, removing it from the
    /// collection on success.
    pub async fn destroy(&mut self) -> OrmResult<bool> {
        let id = match self.state.records.current().and_then(Record::id) {
            Some(id) => id,
            None => {
                self.ctx
                    .errors
                    .report(format!("{}: destroy with no persisted record", self.key));
                return Ok(false);
            }
        };

        let owns_call = self.state.begin_call("destroy", json!(id));

        let extra = EventPayload::new()
            .with("function", json!("destroy"))
            .with("id", json!(id));

        let mut merged = self.fire(lifecycle::PRE_DESTROY, &extra).await?;
        let mut success = false;

        if !merged.flag("skip_destroy") {
            let query = Query::new().eq(&self.config.primary_key, json!(id));
            match self.ctx.storage.delete(&self.config.table, &query).await {
                Ok(_) => {
                    let position = self.state.records.position();
                    self.state.records.remove(position);
                    success = true;
                }
                Err(error) => {
                    self.ctx
                        .errors
                        .report(format!("{}: destroy failed: {}", self.key, error));
                }
            }
        } else {
            success = merged.result_override().unwrap_or(false);
        }

        let post_extra = extra.with("success", json!(success));
        merged.merge(self.fire(lifecycle::POST_DESTROY, &post_extra).await?);

        if owns_call {
            self.state.end_call();
        }
        Ok(merged.result_override().unwrap_or(success))
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        let mut bus = self.ctx.events.write();
        for helper in &mut self.helpers {
            helper.destroy(&mut bus);
        }
        // Stray subscriptions on this instance's namespace go with it.
        bus.destroy_prefixed(self.key.prefix());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventHandler, HookContext};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn setup() -> (AppContext, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (AppContext::new(storage.clone()), storage)
    }

    fn blog_config() -> Arc<ModelConfig> {
        Arc::new(
            ModelConfig::new("blog", "blogs")
                .primary_key("blog_id")
                .columns(&["title", "body"]),
        )
    }

    fn blog(app: &AppContext) -> Model {
        Model::new(blog_config(), app.clone())
    }

    async fn seed_blog(app: &AppContext, title: &str) -> RecordId {
        let mut model = blog(app);
        let mut record = Record::new();
        record.set("title", json!(title));
        record.set("body", json!("..."));
        model.import(record);
        assert!(model.save(false).await.unwrap());
        model.current().unwrap().id().unwrap()
    }

    #[tokio::test]
    async fn test_save_inserts_and_assigns_identity() {
        let (app, storage) = setup();
        let id = seed_blog(&app, "first").await;

        assert_eq!(id, 1);
        let rows = storage.rows("blogs");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["blog_id"], json!(1));
        assert_eq!(rows[0]["title"], json!("first"));
    }

    #[tokio::test]
    async fn test_save_updates_persisted_record() {
        let (app, storage) = setup();
        let id = seed_blog(&app, "before").await;

        let mut model = blog(&app);
        assert!(model
            .load(Query::new().eq("blog_id", json!(id)))
            .await
            .unwrap());
        model.current_mut().unwrap().set("title", json!("after"));
        assert!(model.save(false).await.unwrap());

        let rows = storage.rows("blogs");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], json!("after"));
    }

    #[tokio::test]
    async fn test_load_mirrors_primary_key_into_identity() {
        let (app, _storage) = setup();
        seed_blog(&app, "a").await;
        seed_blog(&app, "b").await;

        let mut model = blog(&app);
        assert!(model.load(Query::new()).await.unwrap());
        assert_eq!(model.records().count(), 2);
        assert_eq!(model.current().unwrap().id(), Some(1));
    }

    #[tokio::test]
    async fn test_load_count_total_ignores_pagination() {
        let (app, _storage) = setup();
        for n in 0..5 {
            seed_blog(&app, &format!("blog {}", n)).await;
        }

        let mut model = blog(&app);
        assert!(model
            .load(Query::new().limit(2).count_total())
            .await
            .unwrap());
        assert_eq!(model.records().count(), 2);
        assert_eq!(model.found_rows(), Some(5));
    }

    #[tokio::test]
    async fn test_save_without_record_reports() {
        let (app, _storage) = setup();
        let mut model = blog(&app);

        assert!(!model.save(false).await.unwrap());
        assert!(!app.errors.is_empty());
    }

    #[tokio::test]
    async fn test_missing_column_config_is_fatal() {
        let (app, _storage) = setup();
        let config = Arc::new(ModelConfig::new("bare", "bares"));
        let mut model = Model::new(config, app.clone());
        model.import(Record::new());

        assert!(matches!(
            model.save(false).await,
            Err(OrmError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_reports_not_errors() {
        let (app, storage) = setup();
        storage.fail_table("blogs");

        let mut model = blog(&app);
        model.import(Record::new());
        assert!(!model.save(false).await.unwrap());
        assert!(!app.errors.is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_id_and_destroy() {
        let (app, storage) = setup();
        let first = seed_blog(&app, "a").await;
        let second = seed_blog(&app, "b").await;
        seed_blog(&app, "c").await;

        let mut model = blog(&app);
        assert!(model.delete_by_id(&[first, second]).await.unwrap());
        assert_eq!(storage.rows("blogs").len(), 1);

        assert!(model.load(Query::new()).await.unwrap());
        assert!(model.destroy().await.unwrap());
        assert!(storage.rows("blogs").is_empty());
        assert!(model.records().is_empty());
    }

    struct Veto {
        flag: &'static str,
        result: bool,
    }

    #[async_trait]
    impl EventHandler for Veto {
        async fn call(
            &self,
            _model: &mut ModelState,
            _cx: &HookContext<'_>,
        ) -> OrmResult<Option<EventResult>> {
            Ok(Some(
                EventResult::new()
                    .with_flag(self.flag, json!(true))
                    .with_flag("result", json!(self.result)),
            ))
        }
    }

    #[tokio::test]
    async fn test_pre_load_veto_skips_query_and_overrides_result() {
        let (app, _storage) = setup();
        seed_blog(&app, "hidden").await;

        let mut model = blog(&app);
        app.events.write().register(
            model.key().event(lifecycle::PRE_LOAD),
            Arc::new(Veto {
                flag: "skip_load",
                result: true,
            }),
            EventPayload::new(),
        );

        assert!(model.load(Query::new()).await.unwrap());
        assert!(model.records().is_empty());
    }

    #[tokio::test]
    async fn test_pre_save_veto_blocks_write() {
        let (app, storage) = setup();
        let mut model = blog(&app);
        app.events.write().register(
            model.key().event(lifecycle::PRE_SAVE),
            Arc::new(Veto {
                flag: "skip_save",
                result: false,
            }),
            EventPayload::new(),
        );

        model.import(Record::new());
        assert!(!model.save(false).await.unwrap());
        assert!(storage.rows("blogs").is_empty());
    }

    struct CallProbe {
        seen: Arc<Mutex<Vec<Option<String>>>>,
    }

    #[async_trait]
    impl EventHandler for CallProbe {
        async fn call(
            &self,
            model: &mut ModelState,
            _cx: &HookContext<'_>,
        ) -> OrmResult<Option<EventResult>> {
            self.seen
                .lock()
                .push(model.call().map(|c| c.function.clone()));
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_call_context_is_visible_to_handlers_and_cleared() {
        let (app, _storage) = setup();
        let mut model = blog(&app);
        let seen = Arc::new(Mutex::new(Vec::new()));
        app.events.write().register(
            model.key().event(lifecycle::PRE_LOAD),
            Arc::new(CallProbe {
                seen: Arc::clone(&seen),
            }),
            EventPayload::new(),
        );

        model.load(Query::new()).await.unwrap();
        assert_eq!(*seen.lock(), vec![Some("load".to_string())]);
        assert!(model.state().call().is_none());
    }

    #[test]
    fn test_nested_call_context_inherits() {
        let mut state = ModelState::new();
        assert!(state.begin_call("load", Value::Null));
        assert!(!state.begin_call("save", Value::Null));
        assert_eq!(state.call().map(|c| c.function.as_str()), Some("load"));
        state.end_call();
        assert!(state.call().is_none());
    }

    #[tokio::test]
    async fn test_fork_is_bare() {
        let (app, _storage) = setup();
        let mut model = blog(&app);
        model.import(Record::new());

        let fork = model.fork();
        assert_ne!(fork.key().prefix(), model.key().prefix());
        assert!(fork.records().is_empty());
        assert!(fork.helper_names().is_empty());
        assert_eq!(fork.config().table, model.config().table);
    }

    #[tokio::test]
    async fn test_drop_clears_event_namespace() {
        let (app, _storage) = setup();
        let event;
        {
            let model = blog(&app);
            event = model.key().event(lifecycle::PRE_LOAD);
            app.events.write().register(
                event.clone(),
                Arc::new(Veto {
                    flag: "skip_load",
                    result: true,
                }),
                EventPayload::new(),
            );
            assert!(app.events.read().exists(&event));
        }
        assert!(!app.events.read().exists(&event));
    }
}
