use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const IMDS_BASE: &str = "http://169.254.169.254";
const IMDS_TIMEOUT: Duration = Duration::from_secs(2);

/// Instance identity captured once at process start. Only the fields the
/// index templates consume are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMetadata {
    pub account: String,
    pub region: String,
    pub vpc_id: String,
}

#[derive(Debug, Deserialize)]
struct IdentityDocument {
    #[serde(rename = "accountId")]
    account_id: String,
    region: String,
}

impl InstanceMetadata {
    /// Fixture values for environments without a metadata service
    /// (developer laptops, CI).
    pub fn fixture() -> Self {
        Self {
            account: "000000000000".to_string(),
            region: "us-east-1".to_string(),
            vpc_id: "vpc-fake".to_string(),
        }
    }

    /// Snapshot the instance identity from the metadata service, falling
    /// back to fixture values when it is unreachable.
    pub async fn snapshot() -> Self {
        match fetch().await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(
                    error = %err,
                    "instance metadata unavailable; using fixture identity"
                );
                Self::fixture()
            }
        }
    }
}

async fn fetch() -> crate::error::Result<InstanceMetadata> {
    let http = reqwest::Client::builder().timeout(IMDS_TIMEOUT).build()?;

    // IMDSv2: a session token gates every read.
    let token = http
        .put(format!("{IMDS_BASE}/latest/api/token"))
        .header("X-aws-ec2-metadata-token-ttl-seconds", "60")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let get = |path: &str| {
        let http = http.clone();
        let token = token.clone();
        let url = format!("{IMDS_BASE}{path}");
        async move {
            http.get(url)
                .header("X-aws-ec2-metadata-token", token)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
                .map_err(crate::error::Error::from)
        }
    };

    let identity: IdentityDocument = serde_json::from_str(
        &get("/latest/dynamic/instance-identity/document").await?,
    )?;

    let macs = get("/latest/meta-data/network/interfaces/macs/").await?;
    let first_mac = macs.lines().next().unwrap_or_default().trim_end_matches('/');
    let vpc_id = if first_mac.is_empty() {
        String::new()
    } else {
        get(&format!(
            "/latest/meta-data/network/interfaces/macs/{first_mac}/vpc-id"
        ))
        .await
        .unwrap_or_default()
    };

    Ok(InstanceMetadata {
        account: identity.account_id,
        region: identity.region,
        vpc_id,
    })
}
