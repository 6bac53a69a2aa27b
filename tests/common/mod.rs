#![allow(dead_code)]

use cps::api;
use cps::app_state::AppState;
use cps::config::ApiVersion;
use cps::domain::{EndpointMap, PropertyBundle, PropertyValue, DISCOVERY_KEY};
use cps::kv::{CacheValue, PropertyCache, WatcherSet};
use cps::secrets::{Decryptor, Parameter, ParameterPage, ParameterStore, SecretError, SecretInjector};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TestApi {
    pub base_url: String,
    pub state: AppState,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestApi {
    /// Serve the configured API surface on an ephemeral local port.
    pub async fn spawn(state: AppState, version: ApiVersion) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let router = api::router(state.clone(), version);

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    server_shutdown.cancelled().await;
                })
                .await
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            state,
            shutdown,
            task,
        })
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

pub fn empty_state(watchers: WatcherSet) -> AppState {
    AppState::new(
        Arc::new(PropertyCache::new()),
        Arc::new(watchers),
        "123456",
        "us-east-1",
    )
}

/// The shared seed state of the v1 scenarios: `service-one` with four
/// scalar properties plus a single discovered endpoint.
pub fn seeded_v1_state() -> AppState {
    let state = empty_state(WatcherSet::new(true, true, false));

    let mut bundle = PropertyBundle::new();
    bundle.insert(
        "string-prop".to_string(),
        PropertyValue::String("string".to_string()),
    );
    bundle.insert("bool-prop".to_string(), PropertyValue::Bool(true));
    bundle.insert("int-prop".to_string(), PropertyValue::Int(1));
    bundle.insert("float-prop".to_string(), PropertyValue::Float(1.5));
    state
        .cache
        .store("123456/us-east-1/service-one", CacheValue::Bundle(bundle));

    let mut endpoints = EndpointMap::new();
    endpoints.insert("service-one".to_string(), vec!["127.0.0.1".to_string()]);
    state
        .cache
        .store(DISCOVERY_KEY, CacheValue::Endpoints(endpoints));

    state
}

/// Parameter store returning a fixed value for every path.
pub struct FixedParameterStore {
    pub value: String,
}

#[async_trait::async_trait]
impl ParameterStore for FixedParameterStore {
    async fn parameters_by_path(
        &self,
        _region: &str,
        path: &str,
        _label: Option<&str>,
        _next_token: Option<String>,
    ) -> Result<ParameterPage, SecretError> {
        Ok(ParameterPage {
            parameters: vec![Parameter {
                name: format!("{path}parameter"),
                value: self.value.clone(),
            }],
            next_token: None,
        })
    }
}

/// Parameter store that fails every lookup.
pub struct FailingParameterStore;

#[async_trait::async_trait]
impl ParameterStore for FailingParameterStore {
    async fn parameters_by_path(
        &self,
        _region: &str,
        _path: &str,
        _label: Option<&str>,
        _next_token: Option<String>,
    ) -> Result<ParameterPage, SecretError> {
        Err(SecretError::Backend {
            tag: "$ssm",
            message: "parameter store unreachable".to_string(),
        })
    }
}

/// Decryptor that returns the ciphertext bytes unchanged.
pub struct EchoDecryptor;

#[async_trait::async_trait]
impl Decryptor for EchoDecryptor {
    async fn decrypt(&self, _region: &str, ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
        Ok(ciphertext.to_vec())
    }
}

pub fn fixed_injector(value: &str) -> Arc<SecretInjector> {
    Arc::new(SecretInjector::new(
        Arc::new(FixedParameterStore {
            value: value.to_string(),
        }),
        Arc::new(EchoDecryptor),
    ))
}

pub fn failing_injector() -> Arc<SecretInjector> {
    Arc::new(SecretInjector::new(
        Arc::new(FailingParameterStore),
        Arc::new(EchoDecryptor),
    ))
}
