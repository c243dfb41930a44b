//! Event-driven model layer.
//!
//! A [`Model`] is a cursor-addressable collection of [`Record`]s plus four
//! lifecycle operations (load, save, delete, destroy), each bracketed by a
//! pre/post event pair on the instance's own [`EventKey`] namespace.
//! Everything optional — validation, relation loading, result caching,
//! denormalized counters, row backup — is a [`ModelHelper`] subscribing hooks
//! to those events; pre hooks can veto the storage step and override the
//! returned value.
//!
//! Persistence sits behind the [`Storage`] trait; [`MemoryStorage`] serves
//! tests and prototyping. Infrastructure failures at runtime are reported to
//! the shared [`ErrorChannel`] and surface as `Ok(false)`, keeping `Err` for
//! misconfiguration.
//!
//! ```no_run
//! use phork_orm::{AppContext, Model, ModelConfig, Query, Record, MemoryStorage};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn demo() -> phork_orm::OrmResult<()> {
//! let app = AppContext::new(Arc::new(MemoryStorage::new()));
//! let config = Arc::new(
//!     ModelConfig::new("post", "posts")
//!         .primary_key("post_id")
//!         .columns(&["title", "body"]),
//! );
//!
//! let mut posts = Model::new(config, app);
//! let mut record = Record::new();
//! record.set("title", json!("hello"));
//! posts.import(record);
//! posts.save(false).await?;
//!
//! posts.load(Query::new().eq("title", json!("hello"))).await?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod events;
pub mod helpers;
pub mod model;
pub mod query;
pub mod record;
pub mod report;
pub mod storage;

pub use context::AppContext;
pub use error::{OrmError, OrmResult};
pub use events::{
    lifecycle, run_event, EventBus, EventHandler, EventKey, EventPayload, EventResult,
    HookContext, RunOptions, Subscription, SubscriptionHandle,
};
pub use helpers::{
    BackupConfig, BackupHelper, BatchLoader, CacheHelper, ConditionSource, CounterConfig,
    CounterHelper, LoadMode, ModelHelper, RelationCondition, RelationConfig, RelationsHelper,
    ValidationHelper,
};
pub use model::{CallContext, Model, ModelConfig, ModelState};
pub use query::{Cmp, Condition, Direction, OrderBy, Query};
pub use record::{Record, RecordId, RecordSet};
pub use report::ErrorChannel;
pub use storage::{MemoryStorage, Row, Storage};
