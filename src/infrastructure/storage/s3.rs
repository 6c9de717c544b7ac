use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use bytes::Bytes;
use tracing::info;

use super::{ObjectMeta, ObjectStore, StorageError, StorageResult};
use crate::config::settings::AppConfig;

#[derive(Clone)]
pub struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    pub fn new(config: &AppConfig) -> Self {
        let credentials = Credentials::new(
            &config.minio_access_key,
            &config.minio_secret_key,
            None,
            None,
            "static",
        );

        let s3_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.minio_region.clone()))
            .endpoint_url(&config.minio_endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(s3_config);

        info!(endpoint = %config.minio_endpoint, bucket = %config.minio_bucket, "S3 client configured");

        Self {
            client,
            bucket: config.minio_bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("put {}: {}", key, e)))?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    GetObjectError::NoSuchKey(_) => StorageError::NotFound(key.to_string()),
                    _ => StorageError::Backend(format!("get {}: {}", key, e)),
                },
                _ => StorageError::Backend(format!("get {}: {}", key, e)),
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("read body of {}: {}", key, e)))?;

        Ok(data.into_bytes())
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(resp) => Ok(Some(ObjectMeta {
                key: key.to_string(),
                size: resp.content_length().unwrap_or_default().max(0) as u64,
                content_type: resp.content_type().map(str::to_string),
            })),
            Err(e) => match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    HeadObjectError::NotFound(_) => Ok(None),
                    _ => Err(StorageError::Backend(format!("head {}: {}", key, e))),
                },
                _ => Err(StorageError::Backend(format!("head {}: {}", key, e))),
            },
        }
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::Backend(format!("list {}: {}", prefix, e)))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("delete {}: {}", key, e)))?;

        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("head bucket {}: {}", self.bucket, e)))?;

        Ok(())
    }
}
