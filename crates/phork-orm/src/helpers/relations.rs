//! Related-record loading helper.
//!
//! After a successful load, each configured relation is resolved per record:
//! conditions are built from literals or from the owning record's own
//! attributes, the target model is loaded through a bare fork, and the
//! resulting rows are attached as an array attribute on the owner. A batch
//! loader can take over a relation wholesale when per-record loads would be
//! too chatty. Nesting is depth-limited.

use crate::error::OrmResult;
use crate::events::{
    lifecycle, EventBus, EventHandler, EventKey, EventPayload, EventResult, HookContext,
};
use crate::helpers::{HelperSubscriptions, ModelHelper};
use crate::model::{Model, ModelConfig, ModelState};
use crate::query::{Cmp, OrderBy, Query};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Where a relation condition's value comes from
#[derive(Debug, Clone)]
pub enum ConditionSource {
    /// A literal value
    Value(Value),
    /// The named attribute of the owning record
    Property(String),
}

#[derive(Debug, Clone)]
pub struct RelationCondition {
    pub column: String,
    pub cmp: Cmp,
    pub source: ConditionSource,
}

/// Takes over loading one relation for the whole record set at once.
#[async_trait]
pub trait BatchLoader: Send + Sync {
    async fn load(
        &self,
        relation: &RelationConfig,
        model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<()>;
}

#[derive(Clone)]
pub struct RelationConfig {
    pub name: String,
    /// Attribute the related rows are attached under
    pub load_as: String,
    /// Attribute the total related-row count is attached under
    pub load_total_as: Option<String>,
    pub auto_load: bool,
    pub target: Arc<ModelConfig>,
    pub conditions: Vec<RelationCondition>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub batch: Option<Arc<dyn BatchLoader>>,
    pub nested: Vec<RelationConfig>,
}

impl RelationConfig {
    pub fn new(name: impl Into<String>, target: Arc<ModelConfig>) -> Self {
        let name = name.into();
        Self {
            load_as: name.clone(),
            name,
            load_total_as: None,
            auto_load: true,
            target,
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            batch: None,
            nested: Vec::new(),
        }
    }

    pub fn load_as(mut self, attr: impl Into<String>) -> Self {
        self.load_as = attr.into();
        self
    }

    pub fn load_total_as(mut self, attr: impl Into<String>) -> Self {
        self.load_total_as = Some(attr.into());
        self
    }

    pub fn manual(mut self) -> Self {
        self.auto_load = false;
        self
    }

    pub fn condition(
        mut self,
        column: impl Into<String>,
        cmp: Cmp,
        source: ConditionSource,
    ) -> Self {
        self.conditions.push(RelationCondition {
            column: column.into(),
            cmp,
            source,
        });
        self
    }

    /// Equality against an attribute of the owning record
    pub fn eq_property(self, column: impl Into<String>, property: impl Into<String>) -> Self {
        self.condition(column, Cmp::Eq, ConditionSource::Property(property.into()))
    }

    /// Equality against a literal
    pub fn eq_value(self, column: impl Into<String>, value: Value) -> Self {
        self.condition(column, Cmp::Eq, ConditionSource::Value(value))
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: crate::query::Direction) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn batch(mut self, loader: Arc<dyn BatchLoader>) -> Self {
        self.batch = Some(loader);
        self
    }

    pub fn nested(mut self, relation: RelationConfig) -> Self {
        self.nested.push(relation);
        self
    }
}

/// Which of the configured relations a load attaches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMode {
    AutoOnly,
    All,
    Named(Vec<String>),
}

impl LoadMode {
    fn selects(&self, relation: &RelationConfig) -> bool {
        match self {
            LoadMode::AutoOnly => relation.auto_load,
            LoadMode::All => true,
            LoadMode::Named(names) => names.iter().any(|name| name == &relation.name),
        }
    }
}

pub struct RelationsHelper {
    relations: Arc<Vec<RelationConfig>>,
    mode: LoadMode,
    recursion: u32,
    subs: HelperSubscriptions,
}

impl RelationsHelper {
    pub fn new(relations: Vec<RelationConfig>) -> Self {
        Self {
            relations: Arc::new(relations),
            mode: LoadMode::AutoOnly,
            recursion: 1,
            subs: HelperSubscriptions::new(),
        }
    }

    pub fn mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// How many levels of nested relations to attach below this one
    pub fn recursion(mut self, levels: u32) -> Self {
        self.recursion = levels;
        self
    }
}

impl ModelHelper for RelationsHelper {
    fn name(&self) -> &str {
        "relations"
    }

    fn init(&mut self, bus: &mut EventBus, key: &EventKey) -> OrmResult<()> {
        self.subs.subscribe(
            bus,
            key.event(lifecycle::POST_LOAD),
            Arc::new(AttachHook {
                relations: Arc::clone(&self.relations),
                mode: self.mode.clone(),
                recursion: self.recursion,
            }),
            EventPayload::new(),
        );
        Ok(())
    }

    fn destroy(&mut self, bus: &mut EventBus) {
        self.subs.unsubscribe_all(bus);
    }
}

struct AttachHook {
    relations: Arc<Vec<RelationConfig>>,
    mode: LoadMode,
    recursion: u32,
}

#[async_trait]
impl EventHandler for AttachHook {
    async fn call(
        &self,
        model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>> {
        if cx.payload.success() != Some(true) {
            return Ok(None);
        }

        for relation in self.relations.iter() {
            if !self.mode.selects(relation) {
                continue;
            }
            if let Some(batch) = &relation.batch {
                batch.load(relation, model, cx).await?;
                continue;
            }
            self.attach_per_record(relation, model, cx).await?;
        }
        Ok(None)
    }
}

impl AttachHook {
    async fn attach_per_record(
        &self,
        relation: &RelationConfig,
        model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<()> {
        for index in 0..model.records.count() {
            // Read what the query needs before anything awaits.
            let query = {
                let Some(record) = model.records.get(index) else {
                    continue;
                };
                if record.has(&relation.load_as) {
                    continue;
                }
                let mut query = Query::default();
                for condition in &relation.conditions {
                    let value = match &condition.source {
                        ConditionSource::Value(value) => value.clone(),
                        ConditionSource::Property(property) => record.attr(property),
                    };
                    query = query.filter(&condition.column, condition.cmp, value);
                }
                query.order = relation.order.clone();
                query.limit = relation.limit;
                query.offset = relation.offset;
                if relation.load_total_as.is_some() {
                    query = query.count_total();
                }
                query
            };

            let mut target = Model::new(Arc::clone(&relation.target), cx.app.clone());
            if self.recursion > 0 && !relation.nested.is_empty() {
                target.attach_helper(Box::new(
                    RelationsHelper::new(relation.nested.clone())
                        .recursion(self.recursion - 1),
                ))?;
            }

            if !target.load(query).await? {
                continue;
            }
            let related: Vec<Value> = target
                .records()
                .iter()
                .map(|record| Value::Object(record.attrs().clone().into_iter().collect()))
                .collect();
            let total = target.found_rows();

            if let Some(record) = model.records.get_mut(index) {
                record.set(&relation.load_as, Value::Array(related));
                if let Some(total_attr) = &relation.load_total_as {
                    record.set(total_attr, json!(total.unwrap_or(0)));
                }
            }
        }
        Ok(())
    }
}
