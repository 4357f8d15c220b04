//! S3-backed object store for export files

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::error::{LedgerError, LedgerResult};
use crate::store::ObjectStore;

pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> LedgerResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| LedgerError::ObjectStore(format!("put {key}: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> LedgerResult<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| LedgerError::ObjectStore(format!("get {key}: {e}")))?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| LedgerError::ObjectStore(format!("read {key}: {e}")))?;
        Ok(bytes.into_bytes().to_vec())
    }
}
