use crate::secrets::{SecretError, SsmStanza};
use async_trait::async_trait;
use aws_sdk_ssm::config::Region;
use aws_sdk_ssm::types::ParameterStringFilter;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// One page of a parameter-store listing.
#[derive(Debug, Clone, Default)]
pub struct ParameterPage {
    pub parameters: Vec<Parameter>,
    pub next_token: Option<String>,
}

/// Seam over the parameter store so tests can substitute a fake backend.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// List decrypted parameters under `path`, optionally filtered by label,
    /// one page at a time.
    async fn parameters_by_path(
        &self,
        region: &str,
        path: &str,
        label: Option<&str>,
        next_token: Option<String>,
    ) -> Result<ParameterPage, SecretError>;
}

/// AWS-backed store. Stanzas name their own region, so clients are built
/// lazily per region from the shared base config.
pub struct AwsParameterStore {
    base: aws_config::SdkConfig,
    clients: Mutex<HashMap<String, aws_sdk_ssm::Client>>,
}

impl AwsParameterStore {
    pub fn new(base: aws_config::SdkConfig) -> Self {
        Self {
            base,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, region: &str) -> aws_sdk_ssm::Client {
        let mut clients = self.clients.lock().await;
        clients
            .entry(region.to_string())
            .or_insert_with(|| {
                let conf = aws_sdk_ssm::config::Builder::from(&self.base)
                    .region(Region::new(region.to_string()))
                    .build();
                aws_sdk_ssm::Client::from_conf(conf)
            })
            .clone()
    }
}

#[async_trait]
impl ParameterStore for AwsParameterStore {
    async fn parameters_by_path(
        &self,
        region: &str,
        path: &str,
        label: Option<&str>,
        next_token: Option<String>,
    ) -> Result<ParameterPage, SecretError> {
        let backend = |message: String| SecretError::Backend {
            tag: "$ssm",
            message,
        };

        let client = self.client(region).await;
        let mut request = client
            .get_parameters_by_path()
            .path(path)
            .with_decryption(true)
            .set_next_token(next_token);

        if let Some(label) = label {
            let filter = ParameterStringFilter::builder()
                .key("Label")
                .option("Equals")
                .values(label)
                .build()
                .map_err(|err| backend(err.to_string()))?;
            request = request.parameter_filters(filter);
        }

        let output = request.send().await.map_err(|err| {
            backend(aws_sdk_ssm::error::DisplayErrorContext(&err).to_string())
        })?;

        let parameters = output
            .parameters
            .unwrap_or_default()
            .into_iter()
            .filter_map(|parameter| {
                let name = parameter.name?;
                let value = parameter.value?;
                Some(Parameter { name, value })
            })
            .collect();

        Ok(ParameterPage {
            parameters,
            next_token: output.next_token,
        })
    }
}

/// Search the parameter store for the value backing `property`.
///
/// With a `service` the lookup walks `/{service}/` and demands an exact
/// name match once the path prefix is stripped; without one it walks `/`
/// and takes the first parameter returned. Pages are consumed until the
/// store stops returning a continuation token.
pub async fn lookup(
    store: &dyn ParameterStore,
    property: &str,
    stanza: &SsmStanza,
) -> Result<String, SecretError> {
    let region = stanza.region.as_deref().unwrap_or_default();
    let service = stanza.service.as_deref().unwrap_or_default();
    let label = stanza.label.as_deref().filter(|label| !label.is_empty());

    let path = if service.is_empty() {
        "/".to_string()
    } else {
        format!("/{service}/")
    };

    let mut next_token = None;
    loop {
        let page = store
            .parameters_by_path(region, &path, label, next_token)
            .await?;

        for parameter in &page.parameters {
            let name = parameter
                .name
                .strip_prefix(&path)
                .unwrap_or(parameter.name.as_str());
            if service.is_empty() || name == property {
                return Ok(parameter.value.clone());
            }
        }

        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    Err(SecretError::NotFound {
        property: property.to_string(),
        path,
    })
}
