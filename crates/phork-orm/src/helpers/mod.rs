//! Model helpers: optional behaviors attached to a model instance.
//!
//! A helper subscribes hooks to its model's lifecycle events on attach and
//! removes exactly those subscriptions on detach. Helpers are identified by
//! name; a model carries at most one helper per name.

use crate::error::OrmResult;
use crate::events::{EventBus, EventHandler, EventKey, EventPayload, SubscriptionHandle};
use std::sync::Arc;

pub mod backup;
pub mod cache;
pub mod counter;
pub mod relations;
pub mod validate;

pub use backup::{BackupConfig, BackupHelper};
pub use cache::CacheHelper;
pub use counter::{CounterConfig, CounterHelper};
pub use relations::{
    BatchLoader, ConditionSource, LoadMode, RelationCondition, RelationConfig, RelationsHelper,
};
pub use validate::ValidationHelper;

pub trait ModelHelper: Send + Sync {
    /// Stable helper name, unique per model
    fn name(&self) -> &str;

    /// Subscribe this helper's hooks to the model's events
    fn init(&mut self, bus: &mut EventBus, key: &EventKey) -> OrmResult<()>;

    /// Remove every subscription made by `init`
    fn destroy(&mut self, bus: &mut EventBus);
}

/// Bookkeeping shared by the built-in helpers: remembers what was subscribed
/// so `destroy` can remove exactly that.
#[derive(Default)]
pub struct HelperSubscriptions {
    subscribed: Vec<(String, SubscriptionHandle)>,
}

impl HelperSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        bus: &mut EventBus,
        event: String,
        handler: Arc<dyn EventHandler>,
        bound: EventPayload,
    ) {
        let handle = bus.register(event.clone(), handler, bound);
        self.subscribed.push((event, handle));
    }

    pub fn unsubscribe_all(&mut self, bus: &mut EventBus) {
        for (event, handle) in self.subscribed.drain(..) {
            let _ = bus.remove(&event, handle);
        }
    }
}
