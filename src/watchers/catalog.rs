use crate::connectors::CatalogClient;
use crate::domain::{EndpointMap, DISCOVERY_KEY};
use crate::error::Result;
use crate::kv::{CacheValue, PropertyCache, WatcherFlags};
use crate::watchers::{available_cores, Watcher};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const HEALTH_WIDTH_PER_CORE: usize = 16;

/// Service-discovery poller (C6). Every tick rebuilds the full endpoint map
/// and publishes it atomically under the reserved key; a failed tick leaves
/// the previous map being served.
pub struct CatalogWatcher {
    client: CatalogClient,
    cache: Arc<PropertyCache>,
    flags: Arc<WatcherFlags>,
    poll_width: usize,
}

impl CatalogWatcher {
    pub fn new(client: CatalogClient, cache: Arc<PropertyCache>, flags: Arc<WatcherFlags>) -> Self {
        Self {
            client,
            cache,
            flags,
            poll_width: available_cores() * HEALTH_WIDTH_PER_CORE,
        }
    }
}

#[async_trait]
impl Watcher for CatalogWatcher {
    fn name(&self) -> &'static str {
        "consul"
    }

    fn flags(&self) -> Arc<WatcherFlags> {
        Arc::clone(&self.flags)
    }

    async fn sync(&self) -> Result<()> {
        info!("catalog sync begun");

        let services = match self.client.services().await {
            Ok(services) => services,
            Err(err) => {
                self.flags.mark_degraded();
                return Err(err);
            }
        };

        // Appends from the health-poll tasks are serialised into this
        // per-tick map; the cache only ever sees the completed map. Each
        // task reports whether its health query succeeded.
        let healthy: Arc<Mutex<EndpointMap>> = Arc::new(Mutex::new(EndpointMap::new()));
        let semaphore = Arc::new(Semaphore::new(self.poll_width));
        let mut tasks: JoinSet<bool> = JoinSet::new();

        for service in services {
            let permit = Arc::clone(&semaphore).acquire_owned().await?;
            let client = self.client.clone();
            let healthy = Arc::clone(&healthy);

            tasks.spawn(async move {
                {
                    let mut map = healthy.lock().expect("endpoint map lock poisoned");
                    map.entry(service.clone()).or_default();
                }

                let entries = match client.service_health(&service).await {
                    Ok(entries) => entries,
                    Err(err) => {
                        error!(service = service.as_str(), error = %err, "failed to query service health");
                        drop(permit);
                        return false;
                    }
                };

                for entry in entries {
                    let status = entry.aggregated_status();
                    if status == "passing" {
                        let mut map = healthy.lock().expect("endpoint map lock poisoned");
                        map.entry(service.clone())
                            .or_default()
                            .push(entry.node.address);
                    } else {
                        info!(service = service.as_str(), aggregated_status = status, "skipping endpoint");
                    }
                }

                drop(permit);
                true
            });
        }

        let mut all_polled = true;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(polled) => all_polled &= polled,
                Err(err) => {
                    warn!(error = %err, "service health task failed");
                    all_polled = false;
                }
            }
        }

        let map = healthy.lock().expect("endpoint map lock poisoned").clone();
        self.cache.store(DISCOVERY_KEY, CacheValue::Endpoints(map));

        if !all_polled {
            self.flags.mark_degraded();
            crate::bail_err!("one or more service health queries failed");
        }

        self.flags.mark_success();
        info!("catalog sync finished");
        Ok(())
    }
}
