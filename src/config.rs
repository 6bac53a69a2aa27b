use crate::error::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Service configuration, readable from `/etc/cps/cps.*`, `./cps.*`, an
/// explicit `--config` file, and `CPS_*` environment variables
/// (`s3.bucket` ⇔ `CPS_S3_BUCKET`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CpsConfig {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub consul: ConsulConfig,
    #[serde(default)]
    pub file: FileConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub secret: SecretConfig,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub dev: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_bucket_region")]
    pub region: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: None,
            region: default_bucket_region(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsulConfig {
    #[serde(default = "default_consul_host")]
    pub host: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            host: default_consul_host(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecretConfig {
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: Option<String>,
}

const fn default_true() -> bool {
    true
}

const fn default_port() -> u16 {
    9100
}

const fn default_version() -> u32 {
    1
}

fn default_bucket_region() -> String {
    "us-east-1".to_string()
}

fn default_consul_host() -> String {
    "localhost:8500".to_string()
}

impl CpsConfig {
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("/etc/cps/cps").required(false))
            .add_source(File::with_name("cps").required(false));

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path));
        }

        let loaded: Self = builder
            .add_source(Environment::with_prefix("CPS").separator("_"))
            .build()?
            .try_deserialize()?;

        Ok(loaded)
    }

    /// Startup validation; failures here are fatal.
    pub fn validate(&self) -> Result<()> {
        if self.account.as_deref().unwrap_or("").is_empty() {
            crate::bail_err!("config `account` is required");
        }
        if self.region.as_deref().unwrap_or("").is_empty() {
            crate::bail_err!("config `region` is required");
        }
        if !self.file.enabled && self.s3.bucket.as_deref().unwrap_or("").is_empty() {
            crate::bail_err!("config `s3.bucket` is required unless `file.enabled` is set");
        }
        if self.file.enabled && self.file.directory.as_deref().unwrap_or("").is_empty() {
            crate::bail_err!("config `file.directory` is required when `file.enabled` is set");
        }
        match self.api.version {
            1 | 2 => {}
            other => crate::bail_err!("unsupported `api.version` {other} (expected 1 or 2)"),
        }
        match self.secret.version {
            1 | 2 => {}
            other => crate::bail_err!("unsupported `secret.version` {other} (expected 1 or 2)"),
        }
        Ok(())
    }

    pub fn account(&self) -> &str {
        self.account.as_deref().unwrap_or_default()
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or_default()
    }

    pub fn api_version(&self) -> ApiVersion {
        if self.api.version == 2 {
            ApiVersion::V2
        } else {
            ApiVersion::V1
        }
    }

    pub fn secret_version(&self) -> SecretVersion {
        if self.secret.version == 2 {
            SecretVersion::V2
        } else {
            SecretVersion::V1
        }
    }
}

/// Which HTTP API surface and source-document format the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

/// Requested secret-injection algorithm. Both versions run the
/// shape-preserving traversal; v1 remains accepted for configurations that
/// predate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretVersion {
    V1,
    V2,
}
