use crate::domain::PropertyValue;
use crate::secrets::{kms, ssm, Decryptor, ParameterStore, SecretError, SecretStanza};
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Replaces secret stanzas in a property tree with resolved plaintext.
///
/// The traversal preserves the shape of every non-secret branch: empty maps
/// stay empty maps, empty lists stay empty lists, nulls stay null. Running
/// it twice is a no-op because the first pass leaves no stanzas behind.
pub struct SecretInjector {
    ssm: Arc<dyn ParameterStore>,
    kms: Arc<dyn Decryptor>,
}

impl SecretInjector {
    pub fn new(ssm: Arc<dyn ParameterStore>, kms: Arc<dyn Decryptor>) -> Self {
        Self { ssm, kms }
    }

    /// Resolve one decoded stanza to its plaintext.
    pub async fn resolve(
        &self,
        property: &str,
        stanza: &SecretStanza,
    ) -> Result<String, SecretError> {
        match stanza {
            SecretStanza::Ssm(ssm_stanza) => {
                ssm::lookup(self.ssm.as_ref(), property, ssm_stanza).await
            }
            SecretStanza::Kms(kms_stanza) => {
                kms::decrypt_stanza(self.kms.as_ref(), property, kms_stanza).await
            }
        }
    }

    /// Rewrite `value`, replacing every stanza with its plaintext.
    ///
    /// `property` is the name context used for parameter-store lookups: a
    /// stanza sitting directly under a map key resolves under that key,
    /// while one nested inside a list inherits the nearest enclosing key.
    /// A resolver failure aborts the whole rewrite so callers never publish
    /// a half-resolved tree.
    pub fn inject<'a>(
        &'a self,
        property: String,
        value: PropertyValue,
    ) -> BoxFuture<'a, Result<PropertyValue, SecretError>> {
        Box::pin(async move {
            if let Some(stanza) = SecretStanza::decode(&property, &value)? {
                let plaintext = self.resolve(&property, &stanza).await?;
                return Ok(PropertyValue::String(plaintext));
            }

            match value {
                PropertyValue::Map(entries) => {
                    let mut out = BTreeMap::new();
                    for (key, entry) in entries {
                        let injected = self.inject(key.clone(), entry).await?;
                        out.insert(key, injected);
                    }
                    Ok(PropertyValue::Map(out))
                }
                PropertyValue::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.inject(property.clone(), item).await?);
                    }
                    Ok(PropertyValue::List(out))
                }
                scalar => Ok(scalar),
            }
        })
    }

    /// Convenience entry point for whole documents.
    pub async fn inject_tree(&self, value: PropertyValue) -> Result<PropertyValue, SecretError> {
        self.inject(String::new(), value).await
    }
}
