//! Pre-save validation helper.
//!
//! Business-rule failures never cross the model boundary as `Err`; they are
//! reported to the error channel inside a group and the save is vetoed with
//! `skip_save`. Uniqueness is checked against storage through a bare fork of
//! the model so the probe load fires none of this model's hooks.

use crate::error::OrmResult;
use crate::events::{lifecycle, EventBus, EventHandler, EventKey, EventPayload, EventResult, HookContext};
use crate::helpers::{HelperSubscriptions, ModelHelper};
use crate::model::{Model, ModelState};
use crate::query::Query;
use async_trait::async_trait;
use phork_validation::{is_empty, FieldRule};
use serde_json::Value;
use std::sync::Arc;

pub struct ValidationHelper {
    rules: Arc<Vec<FieldRule>>,
    subs: HelperSubscriptions,
}

impl ValidationHelper {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self {
            rules: Arc::new(rules),
            subs: HelperSubscriptions::new(),
        }
    }
}

impl ModelHelper for ValidationHelper {
    fn name(&self) -> &str {
        "validate"
    }

    fn init(&mut self, bus: &mut EventBus, key: &EventKey) -> OrmResult<()> {
        self.subs.subscribe(
            bus,
            key.event(lifecycle::PRE_SAVE),
            Arc::new(ValidateHook {
                rules: Arc::clone(&self.rules),
            }),
            EventPayload::new(),
        );
        Ok(())
    }

    fn destroy(&mut self, bus: &mut EventBus) {
        self.subs.unsubscribe_all(bus);
    }
}

struct ValidateHook {
    rules: Arc<Vec<FieldRule>>,
}

#[async_trait]
impl EventHandler for ValidateHook {
    async fn call(
        &self,
        model: &mut ModelState,
        cx: &HookContext<'_>,
    ) -> OrmResult<Option<EventResult>> {
        // Snapshot what the checks need so nothing borrows the state across
        // the uniqueness probes.
        let (record_id, values): (_, Vec<(String, Value)>) = match model.records.current() {
            Some(record) => (
                record.id(),
                self.rules
                    .iter()
                    .map(|rule| (rule.field.clone(), record.attr(&rule.field)))
                    .collect(),
            ),
            None => return Ok(None),
        };

        cx.app.errors.start_group();

        for (rule, (field, value)) in self.rules.iter().zip(&values) {
            for error in rule.check(value) {
                cx.app.errors.report(error.to_string());
            }

            if rule.unique && !rule.disabled && !is_empty(value) {
                let mut probe = Model::new(Arc::clone(cx.config), cx.app.clone());
                probe
                    .load(Query::new().eq(field, value.clone()))
                    .await?;
                let collision = probe.records().iter().any(|other| {
                    match (other.id(), record_id) {
                        (Some(theirs), Some(ours)) => theirs != ours,
                        (Some(_), None) => true,
                        (None, _) => true,
                    }
                });
                if collision {
                    cx.app
                        .errors
                        .report(format!("{}: must be unique", field));
                }
            }
        }

        let failed = !cx.app.errors.end_group().is_empty();
        if failed {
            tracing::debug!(model = %cx.config.name, "validation vetoed save");
            Ok(Some(EventResult::skip("save")))
        } else {
            Ok(None)
        }
    }
}
