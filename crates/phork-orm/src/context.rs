//! Shared application services handed to every model.

use crate::events::EventBus;
use crate::report::ErrorChannel;
use crate::storage::Storage;
use parking_lot::RwLock;
use phork_cache::Cache;
use std::sync::Arc;

/// The services a model needs: the event bus, the storage seam, an optional
/// cache and the shared error channel. Cloning is cheap and every clone sees
/// the same state.
#[derive(Clone)]
pub struct AppContext {
    pub events: Arc<RwLock<EventBus>>,
    pub storage: Arc<dyn Storage>,
    pub cache: Option<Cache>,
    pub errors: Arc<ErrorChannel>,
}

impl AppContext {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            events: Arc::new(RwLock::new(EventBus::new())),
            storage,
            cache: None,
            errors: Arc::new(ErrorChannel::new()),
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }
}
