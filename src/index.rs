use crate::connectors::ObjectStore;
use crate::error::{Context, Result};
use crate::instance::InstanceMetadata;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Well-known key of the index document in the bucket.
pub const INDEX_KEY: &str = "index.json";

/// The index document: a manifest of source stanzas whose paths may carry
/// `{{instance:*}}` template tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDocument {
    #[serde(default)]
    pub version: f64,
    #[serde(default)]
    pub sources: Vec<IndexSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexSource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: IndexParameters,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexParameters {
    pub path: String,
}

/// Turns the index document into concrete object-store prefixes by
/// substituting instance identity into the path templates.
pub struct IndexExpander {
    store: Arc<dyn ObjectStore>,
    instance: InstanceMetadata,
}

impl IndexExpander {
    pub fn new(store: Arc<dyn ObjectStore>, instance: InstanceMetadata) -> Self {
        Self { store, instance }
    }

    pub async fn expand(&self) -> Result<Vec<String>> {
        let body = self
            .store
            .get_object(INDEX_KEY)
            .await
            .context("failed to fetch index document")?;
        let index: IndexDocument =
            serde_json::from_slice(&body).context("index document is not valid JSON")?;

        Ok(index
            .sources
            .iter()
            .map(|source| expand_path(&source.parameters.path, &self.instance))
            .collect())
    }
}

/// Substitute `{{instance:*}}` tokens. A template in the trailing segment
/// expands to `<value>.json`; in an intermediate segment it expands to
/// `<value>/`. Paths without templates pass through untouched.
pub fn expand_path(path: &str, instance: &InstanceMetadata) -> String {
    if !path.contains("{{") {
        return path.to_string();
    }

    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);
    let mut expanded = String::new();

    for (position, segment) in segments.iter().enumerate() {
        if segment.contains("{{") {
            let value = if segment.contains("instance:account") {
                Some(instance.account.as_str())
            } else if segment.contains("instance:vpc") {
                Some(instance.vpc_id.as_str())
            } else if segment.contains("instance:region") {
                Some(instance.region.as_str())
            } else {
                None
            };

            match value {
                Some(value) if position == last => {
                    expanded.push_str(value);
                    expanded.push_str(".json");
                }
                Some(value) => {
                    expanded.push_str(value);
                    expanded.push('/');
                }
                None => {
                    warn!(segment = *segment, path, "unrecognised index template token");
                }
            }
        } else {
            expanded.push_str(segment);
            expanded.push('/');
        }
    }

    expanded
}
