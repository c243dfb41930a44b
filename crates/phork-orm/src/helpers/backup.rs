//! Row backup helper.
//!
//! Before an update, the about-to-be-mutated row is copied into a backup
//! table; before a bulk delete, every matched row is. In fatal mode a backup
//! shortfall vetoes the mutation. For deletes the helper performs the
//! deletion itself, restricted to exactly the rows it managed to back up, and
//! vetoes the outer filter delete so nothing unbacked-up is lost.

use crate::error::OrmResult;
use crate::events::{
    lifecycle, EventBus, EventHandler, EventKey, EventPayload, EventResult, HookContext,
};
use crate::helpers::{HelperSubscriptions, ModelHelper};
use crate::model::ModelState;
use crate::query::Query;
use crate::record::RecordId;
use crate::storage::Row;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub backup_table: String,
    /// Veto the mutation when the backup comes up short
    pub fatal: bool,
    /// Copy rows in one statement instead of one by one
    pub batch: bool,
}

impl BackupConfig {
    pub fn new(backup_table: impl Into<String>) -> Self {
        Self {
            backup_table: backup_table.into(),
            fatal: false,
            batch: false,
        }
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn batch(mut self) -> Self {
        self.batch = true;
        self
    }
}

pub struct BackupHelper {
    config: Arc<BackupConfig>,
    subs: HelperSubscriptions,
}

impl BackupHelper {
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config: Arc::new(config),
            subs: HelperSubscriptions::new(),
        }
    }
}

impl ModelHelper for BackupHelper {
    fn name(&self) -> &str {
        "backup"
    }

    fn init(&mut self, bus: &mut EventBus, key: &EventKey) -> OrmResult<()> {
        self.subs.subscribe(
            bus,
            key.event(lifecycle::PRE_SAVE),
            Arc::new(BackupOnUpdate {
                config: Arc::clone(&self.config),
            }),
            EventPayload::new(),
        );
        self.subs.subscribe(
            bus,
            key.event(lifecycle::PRE_DELETE),
            Arc::new(BackupOnDelete {
                config: Arc::clone(&self.config),
            }),
            EventPayload::new(),
        );
        Ok(())
    }

    fn destroy(&mut self, bus: &mut EventBus) {
        self.subs.unsubscribe_all(bus);
    }
}

struct BackupOnUpdate {
    config: Arc<BackupConfig>,
}

#[async_trait]
impl EventHandler for BackupOnUpdate {
    async fn call(
        &self,
        model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>> {
        // Inserts have no prior state to preserve.
        if cx.payload.new_record() == Some(true) {
            return Ok(None);
        }
        let Some(id) = model.records.current().and_then(|record| record.id()) else {
            return Ok(None);
        };

        let query = Query::new().eq(&cx.config.primary_key, json!(id));
        let rows = match cx.app.storage.select(&cx.config.table, &query).await {
            Ok(rows) => rows,
            Err(error) => {
                cx.app
                    .errors
                    .report(format!("backup reload failed for {}: {}", id, error));
                return Ok(veto_if_fatal(&self.config, "save"));
            }
        };

        let expected = rows.len();
        let mut backed = 0;
        for row in rows {
            match cx
                .app
                .storage
                .insert(&self.config.backup_table, &cx.config.primary_key, row)
                .await
            {
                Ok(_) => backed += 1,
                Err(error) => {
                    cx.app
                        .errors
                        .report(format!("backup write failed for {}: {}", id, error));
                }
            }
        }

        if backed != expected {
            return Ok(veto_if_fatal(&self.config, "save"));
        }
        Ok(None)
    }
}

struct BackupOnDelete {
    config: Arc<BackupConfig>,
}

#[async_trait]
impl EventHandler for BackupOnDelete {
    async fn call(
        &self,
        _model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>> {
        let query = match cx.payload.get("params") {
            Some(params) => serde_json::from_value::<Query>(params.clone())?,
            None => return Ok(None),
        };
        // The delete applies conditions only; back up the same set.
        let matched_query = Query {
            conditions: query.conditions,
            ..Query::default()
        };
        let rows = match cx.app.storage.select(&cx.config.table, &matched_query).await {
            Ok(rows) => rows,
            Err(error) => {
                cx.app
                    .errors
                    .report(format!("backup select failed: {}", error));
                return Ok(veto_if_fatal(&self.config, "delete"));
            }
        };
        if rows.is_empty() {
            return Ok(None);
        }

        let expected = rows.len();
        let backed_ids = self.copy_rows(cx, rows).await;

        if backed_ids.len() != expected {
            cx.app.errors.report(format!(
                "backed up {} of {} rows into {}",
                backed_ids.len(),
                expected,
                self.config.backup_table
            ));
            if self.config.fatal {
                return Ok(Some(EventResult::skip("delete")));
            }
            if backed_ids.is_empty() {
                // Nothing protected, nothing claimed: let the plain delete
                // run.
                return Ok(None);
            }
        }

        // Delete exactly what was backed up, then veto the outer delete.
        let ids: Vec<_> = backed_ids.iter().map(|id| json!(id)).collect();
        let delete_query = Query::new().within(&cx.config.primary_key, ids);
        match cx.app.storage.delete(&cx.config.table, &delete_query).await {
            Ok(_) => Ok(Some(
                EventResult::skip("delete").with_flag("result", json!(true)),
            )),
            Err(error) => {
                cx.app
                    .errors
                    .report(format!("post-backup delete failed: {}", error));
                Ok(Some(EventResult::skip("delete")))
            }
        }
    }
}

impl BackupOnDelete {
    async fn copy_rows(&self, cx: &HookContext<'_>, rows: Vec<Row>) -> Vec<RecordId> {
        let primary_key = &cx.config.primary_key;
        let ids = |rows: &[Row]| {
            rows.iter()
                .filter_map(|row| row.get(primary_key).and_then(|v| v.as_i64()))
                .collect::<Vec<_>>()
        };

        if self.config.batch {
            match cx
                .app
                .storage
                .insert_many(&self.config.backup_table, primary_key, rows.clone())
                .await
            {
                Ok(_) => ids(&rows),
                Err(error) => {
                    cx.app
                        .errors
                        .report(format!("batch backup failed: {}", error));
                    Vec::new()
                }
            }
        } else {
            let mut backed = Vec::new();
            for row in rows {
                let id = row.get(primary_key).and_then(|v| v.as_i64());
                match cx
                    .app
                    .storage
                    .insert(&self.config.backup_table, primary_key, row)
                    .await
                {
                    Ok(_) => backed.extend(id),
                    Err(error) => {
                        cx.app
                            .errors
                            .report(format!("backup write failed: {}", error));
                    }
                }
            }
            backed
        }
    }
}

fn veto_if_fatal(config: &BackupConfig, action: &str) -> Option<EventResult> {
    config.fatal.then(|| EventResult::skip(action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppContext;
    use crate::model::{Model, ModelConfig};
    use crate::record::Record;
    use crate::storage::{MemoryStorage, Storage};

    fn config() -> Arc<ModelConfig> {
        Arc::new(
            ModelConfig::new("post", "posts")
                .primary_key("post_id")
                .columns(&["title"]),
        )
    }

    fn setup() -> (AppContext, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (AppContext::new(storage.clone()), storage)
    }

    fn backed_post(app: &AppContext, backup: BackupConfig) -> Model {
        let mut model = Model::new(config(), app.clone());
        model.attach_helper(Box::new(BackupHelper::new(backup))).unwrap();
        model
    }

    async fn seed(app: &AppContext, title: &str) -> RecordId {
        let mut model = Model::new(config(), app.clone());
        let mut record = Record::new();
        record.set("title", json!(title));
        model.import(record);
        assert!(model.save(false).await.unwrap());
        model.current().unwrap().id().unwrap()
    }

    #[tokio::test]
    async fn test_update_copies_prior_state() {
        let (app, storage) = setup();
        let id = seed(&app, "original").await;

        let mut model = backed_post(&app, BackupConfig::new("posts_backup"));
        assert!(model
            .load(Query::new().eq("post_id", json!(id)))
            .await
            .unwrap());
        model.current_mut().unwrap().set("title", json!("changed"));
        assert!(model.save(false).await.unwrap());

        assert_eq!(storage.rows("posts")[0]["title"], json!("changed"));
        let backup = storage.rows("posts_backup");
        assert_eq!(backup.len(), 1);
        assert_eq!(backup[0]["title"], json!("original"));
    }

    #[tokio::test]
    async fn test_insert_is_not_backed_up() {
        let (app, storage) = setup();
        let mut model = backed_post(&app, BackupConfig::new("posts_backup"));
        let mut record = Record::new();
        record.set("title", json!("fresh"));
        model.import(record);

        assert!(model.save(false).await.unwrap());
        assert!(storage.rows("posts_backup").is_empty());
    }

    #[tokio::test]
    async fn test_delete_backs_up_then_removes() {
        let (app, storage) = setup();
        seed(&app, "a").await;
        seed(&app, "b").await;
        seed(&app, "keep").await;

        let mut model = backed_post(&app, BackupConfig::new("posts_backup"));
        assert!(model
            .delete(Query::new().within(
                "title",
                vec![json!("a"), json!("b")],
            ))
            .await
            .unwrap());

        assert_eq!(storage.rows("posts").len(), 1);
        assert_eq!(storage.rows("posts_backup").len(), 2);
    }

    #[tokio::test]
    async fn test_fatal_backup_failure_vetoes_delete() {
        let (app, storage) = setup();
        seed(&app, "precious").await;
        storage.fail_table("posts_backup");

        let mut model = backed_post(&app, BackupConfig::new("posts_backup").fatal());
        assert!(!model.delete(Query::new()).await.unwrap());

        assert_eq!(storage.rows("posts").len(), 1);
        assert!(!app.errors.is_empty());
    }

    #[tokio::test]
    async fn test_fatal_backup_failure_vetoes_update() {
        let (app, storage) = setup();
        let id = seed(&app, "original").await;
        storage.fail_table("posts_backup");

        let mut model = backed_post(&app, BackupConfig::new("posts_backup").fatal());
        assert!(model
            .load(Query::new().eq("post_id", json!(id)))
            .await
            .unwrap());
        model.current_mut().unwrap().set("title", json!("changed"));
        assert!(!model.save(false).await.unwrap());

        assert_eq!(storage.rows("posts")[0]["title"], json!("original"));
    }

    #[tokio::test]
    async fn test_non_fatal_failure_lets_delete_run() {
        let (app, storage) = setup();
        seed(&app, "gone").await;
        storage.fail_table("posts_backup");

        let mut model = backed_post(&app, BackupConfig::new("posts_backup"));
        assert!(model.delete(Query::new()).await.unwrap());

        assert!(storage.rows("posts").is_empty());
        assert!(storage.rows("posts_backup").is_empty());
        assert!(!app.errors.is_empty());
    }

    #[tokio::test]
    async fn test_batch_mode_backs_up_in_one_statement() {
        let (app, storage) = setup();
        seed(&app, "a").await;
        seed(&app, "b").await;

        let mut model = backed_post(&app, BackupConfig::new("posts_backup").batch());
        assert!(model.delete(Query::new()).await.unwrap());

        assert!(storage.rows("posts").is_empty());
        assert_eq!(storage.rows("posts_backup").len(), 2);
    }
}
