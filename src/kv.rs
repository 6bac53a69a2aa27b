#![forbid(unsafe_code)]

use crate::domain::{EndpointMap, PropertyBundle};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A fully-formed cache artifact. Entries are written whole; readers never
/// observe a partially-built value.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheValue {
    /// Flat v1 bundle, secrets already resolved.
    Bundle(PropertyBundle),
    /// Serialised v2 document (top-level `properties` tree included).
    Document(Bytes),
    /// Service-discovery endpoint map, stored under the reserved key.
    Endpoints(EndpointMap),
}

/// Process-wide key/value store shared between watcher writers and HTTP
/// readers. Values are replaced atomically under the lock; readers clone an
/// `Arc` and drop the guard before touching the payload.
#[derive(Default)]
pub struct PropertyCache {
    inner: RwLock<HashMap<String, Arc<CacheValue>>>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, key: impl Into<String>, value: CacheValue) {
        let mut guard = self.inner.write().expect("property cache lock poisoned");
        guard.insert(key.into(), Arc::new(value));
    }

    pub fn load(&self, key: &str) -> Option<Arc<CacheValue>> {
        let guard = self.inner.read().expect("property cache lock poisoned");
        guard.get(key).cloned()
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut guard = self.inner.write().expect("property cache lock poisoned");
        guard.remove(key).is_some()
    }

    /// Snapshot of present keys; not atomic with respect to concurrent
    /// writers.
    pub fn keys(&self) -> Vec<String> {
        let guard = self.inner.read().expect("property cache lock poisoned");
        guard.keys().cloned().collect()
    }

    pub fn endpoints(&self, key: &str) -> Option<EndpointMap> {
        match self.load(key).as_deref() {
            Some(CacheValue::Endpoints(map)) => Some(map.clone()),
            _ => None,
        }
    }

    pub fn bundle(&self, key: &str) -> Option<PropertyBundle> {
        match self.load(key).as_deref() {
            Some(CacheValue::Bundle(bundle)) => Some(bundle.clone()),
            _ => None,
        }
    }
}

/// Per-watcher readiness flags.
///
/// `up` flips true on the first fully-published batch and stays true through
/// later failures (last-known-good data keeps being served). `health`
/// tracks only the most recent tick.
#[derive(Default)]
pub struct WatcherFlags {
    up: AtomicBool,
    health: AtomicBool,
}

impl WatcherFlags {
    pub fn up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> bool {
        self.health.load(Ordering::SeqCst)
    }

    /// A successful tick: the watcher is both live and ready.
    pub fn mark_success(&self) {
        self.up.store(true, Ordering::SeqCst);
        self.health.store(true, Ordering::SeqCst);
    }

    /// A failed tick degrades readiness but never liveness.
    pub fn mark_degraded(&self) {
        self.health.store(false, Ordering::SeqCst);
    }

    /// Explicit reset, for tests and process bring-up only. Normal error
    /// paths go through `mark_degraded` and leave `up` untouched.
    pub fn reset(&self) {
        self.up.store(false, Ordering::SeqCst);
        self.health.store(false, Ordering::SeqCst);
    }
}

/// One watcher's slot in the shared state: whether configuration enabled it
/// plus its flags. Disabled watchers are excluded from health aggregation.
pub struct WatcherStatus {
    enabled: bool,
    flags: Arc<WatcherFlags>,
}

impl WatcherStatus {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            flags: Arc::new(WatcherFlags::default()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn flags(&self) -> Arc<WatcherFlags> {
        Arc::clone(&self.flags)
    }

    pub fn up(&self) -> bool {
        self.flags.up()
    }

    pub fn health(&self) -> bool {
        self.flags.health()
    }
}

/// All watcher slots, constructed once at startup and threaded into the
/// handlers and watcher tasks by parameter.
pub struct WatcherSet {
    pub object_store: WatcherStatus,
    pub catalog: WatcherStatus,
    pub directory: WatcherStatus,
}

impl WatcherSet {
    pub fn new(object_store: bool, catalog: bool, directory: bool) -> Self {
        Self {
            object_store: WatcherStatus::new(object_store),
            catalog: WatcherStatus::new(catalog),
            directory: WatcherStatus::new(directory),
        }
    }

    fn enabled(&self) -> impl Iterator<Item = &WatcherStatus> {
        [&self.object_store, &self.catalog, &self.directory]
            .into_iter()
            .filter(|status| status.enabled())
    }

    /// Liveness: every enabled watcher has published at least once.
    pub fn all_up(&self) -> bool {
        self.enabled().all(WatcherStatus::up)
    }

    /// Readiness: every enabled watcher's most recent tick succeeded.
    pub fn all_healthy(&self) -> bool {
        self.enabled().all(WatcherStatus::health)
    }
}
