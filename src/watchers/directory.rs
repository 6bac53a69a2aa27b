use crate::config::ApiVersion;
use crate::domain::{PropertyBundle, PropertyValue};
use crate::error::Result;
use crate::kv::{CacheValue, PropertyCache, WatcherFlags};
use crate::secrets::SecretInjector;
use crate::watchers::{build_bundle, Watcher};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Local-directory source (C5). Same publish contract as the object-store
/// watcher, with a directory read in place of the list phase and file reads
/// in place of downloads. One unreadable file never invalidates the rest.
pub struct DirectoryWatcher {
    directory: PathBuf,
    account: String,
    region: String,
    injector: Arc<SecretInjector>,
    cache: Arc<PropertyCache>,
    flags: Arc<WatcherFlags>,
    api: ApiVersion,
}

impl DirectoryWatcher {
    pub fn new(
        directory: impl Into<PathBuf>,
        account: impl Into<String>,
        region: impl Into<String>,
        injector: Arc<SecretInjector>,
        cache: Arc<PropertyCache>,
        flags: Arc<WatcherFlags>,
        api: ApiVersion,
    ) -> Self {
        Self {
            directory: directory.into(),
            account: account.into(),
            region: region.into(),
            injector,
            cache,
            flags,
            api,
        }
    }

    async fn read_sources(&self) -> Result<Vec<(String, Bytes)>> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(err) => {
                self.flags.mark_degraded();
                return Err(crate::err!(
                    "failed to read directory {}: {err}",
                    self.directory.display()
                ));
            }
        };

        let mut sources = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        directory = %self.directory.display(),
                        error = %err,
                        "failed to read directory entry"
                    );
                    continue;
                }
            };

            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(".json") {
                info!(file = file_name.as_str(), "skipping non-JSON file");
                continue;
            }

            match tokio::fs::read(entry.path()).await {
                Ok(body) => sources.push((file_name, Bytes::from(body))),
                Err(err) => {
                    error!(file = file_name.as_str(), error = %err, "failed to read property file");
                }
            }
        }

        sources.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));
        Ok(sources)
    }

    async fn publish_bundles(&self, sources: Vec<(String, Bytes)>) {
        for (file_name, body) in sources {
            let basename = file_name.trim_end_matches(".json");
            let service_key = format!("{}/{}/{}", self.account, self.region, basename);

            let raw: PropertyBundle = match serde_json::from_slice(&body) {
                Ok(raw) => raw,
                Err(err) => {
                    error!(file = file_name.as_str(), error = %err, "invalid property document");
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
                    error!(file = file_name.as_str(), error = %err, "skipping service after secret failure");
                }
            }
        }
    }

    async fn publish_documents(&self, sources: Vec<(String, Bytes)>) -> Result<()> {
        let mut services: BTreeMap<String, PropertyValue> = BTreeMap::new();

        for (file_name, body) in sources {
            let service = file_name.trim_end_matches(".json").to_string();
            match serde_json::from_slice::<PropertyValue>(&body) {
                Ok(document) => {
                    services.insert(service, document);
                }
                Err(err) => {
                    error!(file = file_name.as_str(), error = %err, "invalid property document");
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
impl Watcher for DirectoryWatcher {
    fn name(&self) -> &'static str {
        "file"
    }

    fn flags(&self) -> Arc<WatcherFlags> {
        Arc::clone(&self.flags)
    }

    async fn sync(&self) -> Result<()> {
        info!(directory = %self.directory.display(), "directory sync begun");

        let sources = self.read_sources().await?;

        match self.api {
            ApiVersion::V1 => self.publish_bundles(sources).await,
            ApiVersion::V2 => self.publish_documents(sources).await?,
        }

        self.flags.mark_success();
        info!("directory sync finished");
        Ok(())
    }
}
