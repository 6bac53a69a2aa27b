use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Seam over the remote object store. The watcher and the index expander
/// only ever list keys under a prefix and fetch whole bodies.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
    async fn get_object(&self, key: &str) -> Result<Bytes>;
}

/// S3-backed store scoped to a single bucket.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation.take());
            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }

            let output = request.send().await.map_err(|err| {
                crate::err!(
                    "failed to list bucket `{}` under `{prefix}`: {}",
                    self.bucket,
                    aws_sdk_s3::error::DisplayErrorContext(&err)
                )
            })?;

            keys.extend(
                output
                    .contents
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|object| object.key),
            );

            match output.next_continuation_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                crate::err!(
                    "failed to download `{key}` from bucket `{}`: {}",
                    self.bucket,
                    aws_sdk_s3::error::DisplayErrorContext(&err)
                )
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|err| crate::err!("failed to read body of `{key}`: {err}"))?;

        Ok(body.into_bytes())
    }
}
