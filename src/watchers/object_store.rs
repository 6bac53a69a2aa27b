use crate::config::ApiVersion;
use crate::connectors::ObjectStore;
use crate::domain::{PropertyBundle, PropertyValue};
use crate::error::Result;
use crate::index::IndexExpander;
use crate::kv::{CacheValue, PropertyCache, WatcherFlags};
use crate::secrets::SecretInjector;
use crate::watchers::{available_cores, build_bundle, Watcher};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const FETCH_WIDTH_PER_CORE: usize = 32;

/// Periodic synchroniser from the remote object store (C4). Listing is
/// driven by the index expander; object bodies are fetched with bounded
/// parallelism and published per service.
pub struct ObjectStoreWatcher {
    store: Arc<dyn ObjectStore>,
    expander: IndexExpander,
    injector: Arc<SecretInjector>,
    cache: Arc<PropertyCache>,
    flags: Arc<WatcherFlags>,
    api: ApiVersion,
    fetch_width: usize,
}

impl ObjectStoreWatcher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        expander: IndexExpander,
        injector: Arc<SecretInjector>,
        cache: Arc<PropertyCache>,
        flags: Arc<WatcherFlags>,
        api: ApiVersion,
    ) -> Self {
        Self {
            store,
            expander,
            injector,
            cache,
            flags,
            api,
            fetch_width: available_cores() * FETCH_WIDTH_PER_CORE,
        }
    }

    async fn list_phase(&self) -> Result<Vec<String>> {
        let prefixes = match self.expander.expand().await {
            Ok(prefixes) => prefixes,
            Err(err) => {
                self.flags.mark_degraded();
                return Err(err);
            }
        };

        let mut keys = Vec::new();
        for prefix in &prefixes {
            match self.store.list_keys(prefix).await {
                Ok(listed) => keys.extend(listed),
                Err(err) => {
                    self.flags.mark_degraded();
                    return Err(err);
                }
            }
        }

        Ok(keys)
    }

    async fn fetch_phase(&self, keys: Vec<String>) -> Result<Vec<(String, Result<Bytes>)>> {
        let semaphore = Arc::new(Semaphore::new(self.fetch_width));
        let mut tasks = JoinSet::new();

        for key in keys {
            if !key.ends_with(".json") {
                info!(key = key.as_str(), "skipping non-JSON object");
                continue;
            }

            let permit = Arc::clone(&semaphore).acquire_owned().await?;
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                let body = store.get_object(&key).await;
                drop(permit);
                (key, body)
            });
        }

        let mut fetched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(pair) => fetched.push(pair),
                Err(err) => warn!(error = %err, "object fetch task failed"),
            }
        }

        fetched.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));
        Ok(fetched)
    }

    /// v1: each object is an independent flat bundle keyed by its full path
    /// minus the `.json` extension. A bad object never blocks its siblings,
    /// but a failed download leaves the tick degraded: the return value is
    /// false when any object could not be fetched.
    async fn publish_bundles(&self, fetched: Vec<(String, Result<Bytes>)>) -> bool {
        let mut complete = true;

        for (key, body) in fetched {
            let body = match body {
                Ok(body) => body,
                Err(err) => {
                    self.flags.mark_degraded();
                    error!(key = key.as_str(), error = %err, "failed to download object");
                    complete = false;
                    continue;
                }
            };

            let service_key = key.trim_end_matches(".json").to_string();
            let raw: PropertyBundle = match serde_json::from_slice(&body) {
                Ok(raw) => raw,
                Err(err) => {
                    error!(key = key.as_str(), error = %err, "invalid property document");
                    continue;
                }
            };

            let previous = self.cache.bundle(&service_key);
            match build_bundle(
                self.injector.as_ref(),
                &service_key,
                raw,
                previous.as_ref(),
            )
            .await
            {
                Ok(bundle) => {
                    self.cache.store(service_key, CacheValue::Bundle(bundle));
                }
                Err(err) => {
                    error!(key = key.as_str(), error = %err, "skipping service after secret failure");
                }
            }
        }

        complete
    }

    /// v2: parse every object into the aggregate service map, resolve
    /// secrets once over the whole tree, then publish each service subtree
    /// as a serialised document.
    async fn publish_documents(&self, fetched: Vec<(String, Result<Bytes>)>) -> Result<()> {
        let mut services: BTreeMap<String, PropertyValue> = BTreeMap::new();

        for (key, body) in fetched {
            let body = match body {
                Ok(body) => body,
                Err(err) => {
                    self.flags.mark_degraded();
                    error!(key = key.as_str(), error = %err, "failed to download object");
                    return Err(err);
                }
            };

            let service = key
                .rsplit('/')
                .next()
                .unwrap_or(key.as_str())
                .trim_end_matches(".json")
                .to_string();

            match serde_json::from_slice::<PropertyValue>(&body) {
                Ok(document) => {
                    services.insert(service, document);
                }
                Err(err) => {
                    error!(key = key.as_str(), error = %err, "invalid property document");
                }
            }
        }

        let injected = match self
            .injector
            .inject_tree(PropertyValue::Map(services))
            .await
        {
            Ok(PropertyValue::Map(injected)) => injected,
            Ok(other) => {
                self.flags.mark_degraded();
                crate::bail_err!(
                    "secret injection returned a {} for the aggregate mapping",
                    other.type_name()
                );
            }
            Err(err) => {
                self.flags.mark_degraded();
                return Err(err.into());
            }
        };

        for (service, document) in injected {
            let blob = serde_json::to_vec(&document)?;
            self.cache
                .store(service, CacheValue::Document(Bytes::from(blob)));
        }

        Ok(())
    }
}

#[async_trait]
impl Watcher for ObjectStoreWatcher {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn flags(&self) -> Arc<WatcherFlags> {
        Arc::clone(&self.flags)
    }

    async fn sync(&self) -> Result<()> {
        info!("object store sync begun");

        let keys = self.list_phase().await?;
        let fetched = self.fetch_phase(keys).await?;

        match self.api {
            ApiVersion::V1 => {
                if !self.publish_bundles(fetched).await {
                    crate::bail_err!("one or more objects failed to download");
                }
            }
            ApiVersion::V2 => self.publish_documents(fetched).await?,
        }

        self.flags.mark_success();
        info!("object store sync finished");
        Ok(())
    }
}
