pub mod inject;
pub mod kms;
pub mod ssm;

pub use inject::SecretInjector;
pub use kms::{AwsKmsDecryptor, Decryptor};
pub use ssm::{AwsParameterStore, Parameter, ParameterPage, ParameterStore};

use crate::domain::{PropertyValue, KMS_TAG, SSM_TAG};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("invalid {tag} stanza for property `{property}`: {reason}")]
    InvalidStanza {
        tag: &'static str,
        property: String,
        reason: String,
    },
    #[error("no matching parameter found for property `{property}` under path `{path}`")]
    NotFound { property: String, path: String },
    #[error("invalid base64 ciphertext for property `{property}`: {source}")]
    Ciphertext {
        property: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("{tag} backend error: {message}")]
    Backend { tag: &'static str, message: String },
    #[error("secret plaintext for property `{property}` is not valid UTF-8")]
    Plaintext { property: String },
}

/// Body of an `$ssm` stanza. `region` and `encrypted` must both be present
/// for the stanza to be resolvable; `service` scopes the parameter path and
/// `label` filters server-side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SsmStanza {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub encrypted: Option<String>,
}

/// Body of a `$kms` stanza: a region and a base64 ciphertext blob.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KmsStanza {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub encrypted: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SecretStanza {
    Ssm(SsmStanza),
    Kms(KmsStanza),
}

impl SecretStanza {
    /// Decode `value` when it is a secret stanza. `Ok(None)` means the node
    /// is a plain value; a recognised tag with a malformed or incomplete
    /// body is an `InvalidStanza` error.
    pub fn decode(property: &str, value: &PropertyValue) -> Result<Option<Self>, SecretError> {
        let Some(tag) = value.stanza_tag() else {
            return Ok(None);
        };
        let PropertyValue::Map(entries) = value else {
            return Ok(None);
        };
        let body = entries.get(tag).cloned().unwrap_or(PropertyValue::Null);
        let body = serde_json::Value::from(body);

        let invalid = |reason: String| SecretError::InvalidStanza {
            tag,
            property: property.to_string(),
            reason,
        };

        match tag {
            SSM_TAG => {
                let stanza: SsmStanza =
                    serde_json::from_value(body).map_err(|err| invalid(err.to_string()))?;
                if stanza.region.as_deref().unwrap_or("").is_empty() {
                    return Err(invalid("missing `region`".to_string()));
                }
                if stanza.encrypted.as_deref().unwrap_or("").is_empty() {
                    return Err(invalid("missing `encrypted`".to_string()));
                }
                Ok(Some(SecretStanza::Ssm(stanza)))
            }
            KMS_TAG => {
                let stanza: KmsStanza =
                    serde_json::from_value(body).map_err(|err| invalid(err.to_string()))?;
                if stanza.region.as_deref().unwrap_or("").is_empty() {
                    return Err(invalid("missing `region`".to_string()));
                }
                if stanza.encrypted.as_deref().unwrap_or("").is_empty() {
                    return Err(invalid("missing `encrypted`".to_string()));
                }
                Ok(Some(SecretStanza::Kms(stanza)))
            }
            _ => Ok(None),
        }
    }
}
