pub mod catalog;
pub mod directory;
pub mod object_store;

pub use catalog::CatalogWatcher;
pub use directory::DirectoryWatcher;
pub use object_store::ObjectStoreWatcher;

use crate::domain::{PropertyBundle, PropertyValue};
use crate::error::Result;
use crate::kv::WatcherFlags;
use crate::secrets::{SecretInjector, SecretStanza};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Per-tick deadline for upstream work. A tick that overruns is abandoned
/// and retried on the next interval; served data stays as-is.
pub const TICK_DEADLINE: Duration = Duration::from_secs(50);

/// A periodic source poller. `sync` performs one full tick: fetch, parse,
/// resolve, publish. Implementations set their own flags at failure sites;
/// the scaffolding only handles deadlines and panics.
#[async_trait]
pub trait Watcher: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn flags(&self) -> Arc<WatcherFlags>;
    async fn sync(&self) -> Result<()>;
}

/// Run a single tick with panic containment and the tick deadline. A
/// panicking or overrunning tick degrades readiness and is retried on the
/// next interval; it never takes the process down.
pub async fn run_tick(watcher: &Arc<dyn Watcher>) {
    let name = watcher.name();
    let task = {
        let watcher = Arc::clone(watcher);
        tokio::spawn(async move { tokio::time::timeout(TICK_DEADLINE, watcher.sync()).await })
    };

    match task.await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => {
            error!(watcher = name, error = %err, "watcher tick failed");
        }
        Ok(Err(_elapsed)) => {
            watcher.flags().mark_degraded();
            error!(
                watcher = name,
                deadline_secs = TICK_DEADLINE.as_secs(),
                "watcher tick exceeded deadline"
            );
        }
        Err(join_err) => {
            watcher.flags().mark_degraded();
            if join_err.is_panic() {
                error!(watcher = name, "watcher tick panicked");
            } else {
                error!(watcher = name, error = %join_err, "watcher tick aborted");
            }
        }
    }
}

/// Spawn the periodic loop for a watcher whose first tick already ran
/// synchronously during startup.
pub fn spawn(watcher: Arc<dyn Watcher>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The interval's immediate first tick corresponds to the startup
        // sync that already happened.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(watcher = watcher.name(), "watcher stopping");
                    break;
                }
                _ = ticker.tick() => {
                    run_tick(&watcher).await;
                }
            }
        }
    })
}

pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Build a resolved v1 bundle from a freshly parsed flat document.
///
/// Coercions: null becomes the empty string (historical client compat),
/// mappings must be secret stanzas, lists have no v1 representation and are
/// dropped with a log. A failed resolution falls back to the previously
/// cached value for that property; with nothing cached the whole service is
/// skipped by returning the error.
pub(crate) async fn build_bundle(
    injector: &SecretInjector,
    service_key: &str,
    raw: PropertyBundle,
    previous: Option<&PropertyBundle>,
) -> Result<PropertyBundle> {
    let mut bundle = PropertyBundle::new();

    for (name, value) in raw {
        match value {
            PropertyValue::Null => {
                bundle.insert(name, PropertyValue::String(String::new()));
            }
            PropertyValue::Map(_) => {
                let stanza = match SecretStanza::decode(&name, &value) {
                    Ok(Some(stanza)) => stanza,
                    Ok(None) => {
                        warn!(
                            service = service_key,
                            property = name.as_str(),
                            "dropping mapping property that is not a secret stanza"
                        );
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                };

                match injector.resolve(&name, &stanza).await {
                    Ok(plaintext) => {
                        bundle.insert(name, PropertyValue::String(plaintext));
                    }
                    Err(err) => match previous.and_then(|bundle| bundle.get(&name)) {
                        Some(cached) => {
                            warn!(
                                service = service_key,
                                property = name.as_str(),
                                error = %err,
                                "secret resolution failed; keeping previously cached value"
                            );
                            bundle.insert(name, cached.clone());
                        }
                        None => return Err(err.into()),
                    },
                }
            }
            PropertyValue::List(_) => {
                warn!(
                    service = service_key,
                    property = name.as_str(),
                    kind = value.type_name(),
                    "unsupported property shape in flat bundle"
                );
            }
            scalar => {
                bundle.insert(name, scalar);
            }
        }
    }

    Ok(bundle)
}
