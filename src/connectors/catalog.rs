use crate::error::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimal client for the service catalog's HTTP API. Only two read
/// endpoints are needed: the service listing and per-service health.
#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base: Url,
}

/// One health entry for a service instance: the node it runs on plus the
/// checks that gate it.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceHealth {
    #[serde(rename = "Node")]
    pub node: HealthNode,
    #[serde(rename = "Checks", default)]
    pub checks: Vec<HealthCheck>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthNode {
    #[serde(rename = "Address")]
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "Status")]
    pub status: String,
}

impl ServiceHealth {
    /// Worst-of semantics over the entry's checks: any critical check makes
    /// the entry critical, any warning makes it warning, otherwise passing.
    pub fn aggregated_status(&self) -> &'static str {
        let mut warning = false;
        for check in &self.checks {
            match check.status.as_str() {
                "critical" => return "critical",
                "warning" => warning = true,
                _ => {}
            }
        }
        if warning {
            "warning"
        } else {
            "passing"
        }
    }
}

impl CatalogClient {
    /// `host` is the bare `host:port` the catalog listens on; the scheme is
    /// always plain HTTP, matching the sidecar deployment.
    pub fn new(host: &str) -> Result<Self> {
        let base = Url::parse(&format!("http://{host}"))
            .with_context(|| format!("invalid catalog host `{host}`"))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to construct catalog HTTP client")?;

        Ok(Self { http, base })
    }

    /// For tests: point the client at an arbitrary base URL.
    pub fn with_base_url(base: Url) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to construct catalog HTTP client")?;
        Ok(Self { http, base })
    }

    /// All known service names.
    pub async fn services(&self) -> Result<Vec<String>> {
        let url = self.base.join("/v1/catalog/services")?;
        let listing: BTreeMap<String, Vec<String>> = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(listing.into_keys().collect())
    }

    /// Health entries for one service.
    pub async fn service_health(&self, service: &str) -> Result<Vec<ServiceHealth>> {
        let url = self.base.join(&format!("/v1/health/service/{service}"))?;
        let entries: Vec<ServiceHealth> = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(entries)
    }
}
