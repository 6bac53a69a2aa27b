use crate::api;
use crate::app_state::AppState;
use crate::config::{ApiVersion, CpsConfig, SecretVersion};
use crate::connectors::{CatalogClient, ObjectStore, S3ObjectStore};
use crate::domain::{EndpointMap, DISCOVERY_KEY};
use crate::error::{Context, Result};
use crate::index::IndexExpander;
use crate::instance::InstanceMetadata;
use crate::kv::{CacheValue, PropertyCache, WatcherSet};
use crate::secrets::{AwsKmsDecryptor, AwsParameterStore, SecretInjector};
use crate::watchers::{self, CatalogWatcher, DirectoryWatcher, ObjectStoreWatcher, Watcher};
use aws_sdk_s3::config::Region;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct CpsApp {
    state: AppState,
    watchers: Vec<Arc<dyn Watcher>>,
    api: ApiVersion,
    port: u16,
    dev: bool,
    shutdown: tokio_util::sync::CancellationToken,
}

impl CpsApp {
    pub async fn initialise(config: CpsConfig) -> Result<Self> {
        config.validate()?;

        let account = config.account().to_string();
        let region = config.region().to_string();
        let api = config.api_version();

        let file_enabled = config.file.enabled;
        let mut s3_enabled = config.s3.enabled;
        // Service discovery only participates in the v1 surface.
        let mut consul_enabled = config.consul.enabled && api == ApiVersion::V1;

        if file_enabled {
            info!("file mode is enabled, disabling s3 and consul watchers");
            s3_enabled = false;
            consul_enabled = false;
        }

        if config.secret_version() == SecretVersion::V1 {
            warn!(
                "secret.version=1 requested; running the shape-preserving injection algorithm"
            );
        }

        let cache = Arc::new(PropertyCache::new());
        let watcher_set = Arc::new(WatcherSet::new(s3_enabled, consul_enabled, file_enabled));

        // With discovery off, v1 handlers still merge the reserved key, so
        // the empty map must exist before the first request is served.
        if api == ApiVersion::V1 && !consul_enabled {
            cache.store(DISCOVERY_KEY, CacheValue::Endpoints(EndpointMap::new()));
        }

        let mut watcher_tasks: Vec<Arc<dyn Watcher>> = Vec::new();

        let injector = if s3_enabled || file_enabled {
            let aws = aws_config::load_from_env().await;
            Some((
                Arc::new(SecretInjector::new(
                    Arc::new(AwsParameterStore::new(aws.clone())),
                    Arc::new(AwsKmsDecryptor::new(aws.clone())),
                )),
                aws,
            ))
        } else {
            None
        };

        if s3_enabled {
            let (injector, aws) = injector
                .as_ref()
                .map(|(injector, aws)| (Arc::clone(injector), aws))
                .ok_or_else(|| crate::err!("object store watcher requires AWS configuration"))?;

            let bucket = config.s3.bucket.clone().unwrap_or_default();
            let s3_conf = aws_sdk_s3::config::Builder::from(aws)
                .region(Region::new(config.s3.region.clone()))
                .build();
            let store: Arc<dyn ObjectStore> =
                Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::from_conf(s3_conf), bucket));

            let instance = InstanceMetadata::snapshot().await;
            let expander = IndexExpander::new(Arc::clone(&store), instance);

            watcher_tasks.push(Arc::new(ObjectStoreWatcher::new(
                store,
                expander,
                injector,
                Arc::clone(&cache),
                watcher_set.object_store.flags(),
                api,
            )));
        }

        if consul_enabled {
            let client = CatalogClient::new(&config.consul.host)
                .with_context(|| format!("invalid consul host `{}`", config.consul.host))?;
            watcher_tasks.push(Arc::new(CatalogWatcher::new(
                client,
                Arc::clone(&cache),
                watcher_set.catalog.flags(),
            )));
        }

        if file_enabled {
            let (injector, _) = injector
                .as_ref()
                .map(|(injector, aws)| (Arc::clone(injector), aws))
                .ok_or_else(|| crate::err!("directory watcher requires AWS configuration"))?;

            let directory = config.file.directory.clone().unwrap_or_default();
            watcher_tasks.push(Arc::new(DirectoryWatcher::new(
                directory,
                account.clone(),
                region.clone(),
                injector,
                Arc::clone(&cache),
                watcher_set.directory.flags(),
                api,
            )));
        }

        let state = AppState::new(cache, watcher_set, account, region);

        Ok(Self {
            state,
            watchers: watcher_tasks,
            api,
            port: config.port,
            dev: config.dev,
            shutdown: tokio_util::sync::CancellationToken::new(),
        })
    }

    pub async fn run(self) -> Result<()> {
        // First tick runs synchronously so the cache is populated before
        // the listener starts accepting.
        for watcher in &self.watchers {
            watchers::run_tick(watcher).await;
        }

        if self.dev {
            for (method, path) in route_table(self.api) {
                info!(method, path, "route registered");
            }
        }

        let router = api::router(self.state.clone(), self.api);
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to attach to port {}", self.port))?;
        info!(address = %addr, "listening");

        let loops: Vec<_> = self
            .watchers
            .iter()
            .cloned()
            .map(|watcher| watchers::spawn(watcher, self.shutdown.clone()))
            .collect();

        let server_shutdown = self.shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    server_shutdown.cancelled().await;
                })
                .await
        });

        tokio::select! {
            result = &mut server => {
                warn!("HTTP server task terminated unexpectedly");
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => return Err(crate::err!("HTTP server error: {err}")),
                    Err(join_err) => return Err(crate::err!("HTTP server join error: {join_err}")),
                }
            }
            _ = shutdown_signal() => {
                info!("shutdown signal received");
            }
        }

        self.shutdown.cancel();
        if !server.is_finished() {
            match server.await {
                Ok(Ok(())) | Err(_) => {}
                Ok(Err(err)) => return Err(crate::err!("HTTP server error: {err}")),
            }
        }
        for task in loops {
            let _ = task.await;
        }

        info!("shutdown complete");
        Ok(())
    }
}

fn route_table(api: ApiVersion) -> &'static [(&'static str, &'static str)] {
    match api {
        ApiVersion::V1 => &[
            ("GET", "/v1/properties/{service}"),
            ("GET", "/v1/properties/{service}/{property}"),
            ("GET", "/v1/conqueso/{service}"),
            ("POST", "/v1/conqueso/{service}"),
            ("GET", "/v1/health"),
            ("GET", "/v1/healthz"),
        ],
        ApiVersion::V2 => &[
            ("GET", "/v2/properties/{scope}"),
            ("GET", "/v2/healthz"),
        ],
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
