//! S3-compatible object store adapter.
//!
//! Implements [`pipeline::ObjectStore`] with `aws-sdk-s3`. Works against AWS
//! itself and against self-hosted S3-compatible services (MinIO, Ceph): a
//! custom endpoint switches the client to path-style addressing.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Credentials, endpoints, pagination and SDK error
//! mapping live here. The [`pipeline`] crate sees only
//! [`pipeline::ObjectStore`] and [`pipeline::StoreError`].

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use pipeline::{ObjectKey, ObjectMeta, ObjectStore, StoreError};
use tracing::debug;

// RFC 3986 unreserved characters and the path separator pass through.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Connection settings for one bucket.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub region: String,
    /// Custom endpoint for S3-compatible services; `None` uses AWS.
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

/// [`ObjectStore`] backed by one S3 bucket.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Builds a client from `settings` with static credentials.
    pub async fn connect(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(Credentials::new(
                settings.access_key.clone(),
                settings.secret_key.clone(),
                None,
                None,
                "rm-notify-static",
            ));
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut config = aws_sdk_s3::config::Builder::from(&shared);
        if settings.endpoint.is_some() {
            config = config.force_path_style(true);
        }

        Self::new(Client::from_conf(config.build()), settings.bucket.clone())
    }

    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// The `x-amz-copy-source` value for `key`, which S3 requires URL-encoded.
    fn copy_source(&self, key: &ObjectKey) -> String {
        format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(key.as_str(), COPY_SOURCE)
        )
    }
}

fn unavailable<E>(operation: &str, err: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::Unavailable(format!("{operation}: {}", DisplayErrorContext(&err)))
}

fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        let mut objects = Vec::new();
        let mut continuation_token = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }
            let output = request
                .send()
                .await
                .map_err(|err| unavailable("list_objects_v2", err))?;

            for object in output.contents() {
                let Some(key) = object.key().and_then(ObjectKey::new) else {
                    continue;
                };
                objects.push(ObjectMeta {
                    key,
                    last_modified: object.last_modified().and_then(to_chrono),
                    size: object.size().and_then(|size| u64::try_from(size).ok()),
                });
            }

            match output.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }
        debug!(bucket = %self.bucket, prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|err| match err.into_service_error() {
                GetObjectError::NoSuchKey(_) => StoreError::NotFound(key.to_string()),
                other => unavailable("get_object", other),
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|err| unavailable("get_object body", err))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn copy(&self, src: &ObjectKey, dst: &ObjectKey) -> Result<(), StoreError> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(self.copy_source(src))
            .key(dst.as_str())
            .send()
            .await
            .map_err(|err| unavailable("copy_object", err))?;
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|err| unavailable("delete_object", err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_source_is_bucket_qualified_and_encoded() {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("ap-northeast-2"))
            .build();
        let store = S3ObjectStore::new(Client::from_conf(config), "events");

        let key = ObjectKey::new("issues/a.json").unwrap();
        assert_eq!(store.copy_source(&key), "events/issues/a.json");

        let key = ObjectKey::new("issues/일감 a+b%.json").unwrap();
        assert_eq!(
            store.copy_source(&key),
            "events/issues/%EC%9D%BC%EA%B0%90%20a%2Bb%25.json"
        );
    }

    #[test]
    fn test_sdk_timestamps_convert_to_utc() {
        let value = aws_sdk_s3::primitives::DateTime::from_secs(1_714_525_200);
        assert_eq!(
            to_chrono(&value).unwrap().to_rfc3339(),
            "2024-05-01T01:00:00+00:00"
        );
    }
}
