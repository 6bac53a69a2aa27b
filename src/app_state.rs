use crate::kv::{PropertyCache, WatcherSet};
use std::sync::Arc;

/// Shared state threaded into HTTP handlers and background watchers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<PropertyCache>,
    pub watchers: Arc<WatcherSet>,
    pub account: String,
    pub region: String,
}

impl AppState {
    pub fn new(
        cache: Arc<PropertyCache>,
        watchers: Arc<WatcherSet>,
        account: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            watchers,
            account: account.into(),
            region: region.into(),
        }
    }

    /// Cache key for a v1 service bundle.
    pub fn service_key(&self, service: &str) -> String {
        format!("{}/{}/{}", self.account, self.region, service)
    }
}
