//! Object storage for rendered report PDFs.
//!
//! Upload failures must never fail report generation; the reports service
//! degrades to on-the-fly rendering until storage recovers.

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use service_core::error::AppError;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError>;
    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
    /// Expiring URL for sharing an object without credentials.
    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, AppError>;
}

/// Filesystem-backed storage for development and tests.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.base_path.join(key);
        let data = fs::read(path).await?;
        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.base_path.join(key);
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn signed_url(&self, key: &str, _ttl: Duration) -> Result<String, AppError> {
        // No signing for local files; the path itself is the link.
        Ok(format!("file://{}", self.base_path.join(key).display()))
    }
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 upload failed: {}", e)))?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 download failed: {}", e)))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("S3 body collection failed: {}", e))
            })?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 delete failed: {}", e)))?;
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, AppError> {
        let config = PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid TTL: {}", e)))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("S3 presign failed: {}", e)))?;

        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_storage_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .upload("reports/lab/a.pdf", b"%PDF-1.3 test".to_vec())
            .await
            .unwrap();
        let data = storage.download("reports/lab/a.pdf").await.unwrap();
        assert_eq!(data, b"%PDF-1.3 test");

        storage.delete("reports/lab/a.pdf").await.unwrap();
        assert!(storage.download("reports/lab/a.pdf").await.is_err());
    }

    #[tokio::test]
    async fn local_signed_url_points_at_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let url = storage
            .signed_url("reports/x.pdf", Duration::from_secs(600))
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("reports/x.pdf"));
    }

    #[tokio::test]
    async fn deleting_a_missing_key_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        storage.delete("never-uploaded.pdf").await.unwrap();
    }
}
