use crate::secrets::{KmsStanza, SecretError};
use async_trait::async_trait;
use aws_sdk_kms::config::Region;
use aws_sdk_kms::primitives::Blob;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Seam over the key-management decrypt call.
#[async_trait]
pub trait Decryptor: Send + Sync {
    async fn decrypt(&self, region: &str, ciphertext: &[u8]) -> Result<Vec<u8>, SecretError>;
}

/// AWS-backed decryptor with per-region client reuse.
pub struct AwsKmsDecryptor {
    base: aws_config::SdkConfig,
    clients: Mutex<HashMap<String, aws_sdk_kms::Client>>,
}

impl AwsKmsDecryptor {
    pub fn new(base: aws_config::SdkConfig) -> Self {
        Self {
            base,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, region: &str) -> aws_sdk_kms::Client {
        let mut clients = self.clients.lock().await;
        clients
            .entry(region.to_string())
            .or_insert_with(|| {
                let conf = aws_sdk_kms::config::Builder::from(&self.base)
                    .region(Region::new(region.to_string()))
                    .build();
                aws_sdk_kms::Client::from_conf(conf)
            })
            .clone()
    }
}

#[async_trait]
impl Decryptor for AwsKmsDecryptor {
    async fn decrypt(&self, region: &str, ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
        let client = self.client(region).await;
        let output = client
            .decrypt()
            .ciphertext_blob(Blob::new(ciphertext))
            .send()
            .await
            .map_err(|err| SecretError::Backend {
                tag: "$kms",
                message: aws_sdk_kms::error::DisplayErrorContext(&err).to_string(),
            })?;

        Ok(output
            .plaintext
            .map(Blob::into_inner)
            .unwrap_or_default())
    }
}

/// Decode the stanza's base64 ciphertext, decrypt it, and return the
/// plaintext as a string.
pub async fn decrypt_stanza(
    decryptor: &dyn Decryptor,
    property: &str,
    stanza: &KmsStanza,
) -> Result<String, SecretError> {
    let region = stanza.region.as_deref().unwrap_or_default();
    let encrypted = stanza.encrypted.as_deref().unwrap_or_default();

    let ciphertext = BASE64
        .decode(encrypted)
        .map_err(|source| SecretError::Ciphertext {
            property: property.to_string(),
            source,
        })?;

    let plaintext = decryptor.decrypt(region, &ciphertext).await?;
    String::from_utf8(plaintext).map_err(|_| SecretError::Plaintext {
        property: property.to_string(),
    })
}
