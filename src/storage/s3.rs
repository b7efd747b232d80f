//! S3-compatible storage backend.
//!
//! All four attachment buckets live inside one S3 bucket, each under its own
//! key prefix: `<prefix><bucket>/<classroom_id>/<object>`.

use std::fmt::Display;

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Builder, Region},
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;

use super::backend::{StorageBackend, StorageError, StorageResult};

const MINIO_REGION: &str = "us-east-1";

#[derive(Clone, Debug)]
pub struct S3Config {
    pub bucket: String,
    /// Prepended to every object key, e.g. `"classroom/"`
    pub prefix: Option<String>,
    pub region: String,
    /// Custom endpoint for MinIO, R2 and friends
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

impl S3Config {
    pub fn aws(bucket: String, region: String) -> Self {
        Self {
            bucket,
            prefix: None,
            region,
            endpoint: None,
            force_path_style: false,
        }
    }

    /// Path-style addressing against a self-hosted endpoint
    pub fn minio(bucket: String, endpoint: String) -> Self {
        Self {
            bucket,
            prefix: None,
            region: MINIO_REGION.to_string(),
            endpoint: Some(endpoint),
            force_path_style: true,
        }
    }

    pub fn with_prefix(mut self, prefix: String) -> Self {
        self.prefix = Some(prefix);
        self
    }
}

pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

/// Missing objects surface as service errors whose text names the cause
fn is_missing(message: &str) -> bool {
    ["NoSuchKey", "NotFound", "404"].iter().any(|marker| message.contains(marker))
}

fn sdk_error(err: impl Display) -> StorageError {
    StorageError::Other(err.to_string())
}

impl S3Storage {
    pub async fn new(config: S3Config) -> Self {
        let mut builder = Builder::new()
            .region(Region::new(config.region))
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        // Credentials come from the usual AWS environment chain
        let shared = aws_config::load_from_env().await;
        if let Some(credentials) = shared.credentials_provider() {
            builder = builder.credentials_provider(credentials);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            prefix: config.prefix.unwrap_or_default(),
        }
    }

    fn namespace(&self, bucket: &str) -> String {
        format!("{}{}/", self.prefix, bucket)
    }

    fn object_key(&self, bucket: &str, key: &str) -> String {
        format!("{}{}", self.namespace(bucket), key)
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(bucket, key))
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if is_missing(&message) {
                    StorageError::NotFound(format!("{}/{}", bucket, key))
                } else {
                    StorageError::Other(message)
                }
            })?;

        let body = response.body.collect().await.map_err(sdk_error)?;
        Ok(body.into_bytes())
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(bucket, key))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    /// S3 deletes are idempotent; a missing key is not an error
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.object_key(bucket, key))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(bucket, key))
            .send()
            .await;

        match head {
            Ok(_) => Ok(true),
            Err(e) if is_missing(&e.to_string()) => Ok(false),
            Err(e) => Err(sdk_error(e)),
        }
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let namespace = self.namespace(bucket);
        let search = format!("{}{}", namespace, prefix.unwrap_or_default());

        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&search)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(sdk_error)?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter_map(|full| full.strip_prefix(&namespace))
                    .map(str::to_string),
            );

            match page.next_continuation_token() {
                Some(next) if page.is_truncated().unwrap_or(false) => token = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_object_detection() {
        assert!(is_missing("service error: NoSuchKey"));
        assert!(is_missing("unhandled error (NotFound)"));
        assert!(!is_missing("AccessDenied"));
    }

    #[test]
    fn test_config_constructors() {
        let aws = S3Config::aws("files".into(), "eu-west-1".into()).with_prefix("classroom/".into());
        assert_eq!(aws.prefix.as_deref(), Some("classroom/"));
        assert!(!aws.force_path_style);

        let minio = S3Config::minio("files".into(), "http://localhost:9000".into());
        assert_eq!(minio.region, MINIO_REGION);
        assert!(minio.force_path_style);
    }
}
