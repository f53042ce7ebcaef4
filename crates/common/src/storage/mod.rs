//! Object storage abstraction
//!
//! Patient documents and generated reports live in a bucket. Clients upload
//! and download directly through short-lived signed URLs; the analysis
//! lifecycle reads and writes objects server-side.
//!
//! Providers:
//! - S3 and S3-compatible stores (MinIO, R2) via `aws-sdk-s3`
//! - In-process map for tests and local runs

use crate::config::StorageConfig;
use crate::domain::DocumentType;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Trait for object storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Signed URL a client can PUT the object to
    async fn presign_put(&self, key: &str, content_type: &str, expires_in: Duration) -> Result<String>;

    /// Signed URL a client can GET the object from
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String>;

    async fn put_object(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<()>;

    /// Missing objects are a `StorageRead` error
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

/// Build a fresh object key: `patients/{patient}/{category}/{uuid}-{ms}.{ext}`
pub fn storage_key(patient_id: Uuid, document_type: DocumentType, extension: Option<&str>) -> String {
    format!(
        "patients/{}/{}/{}-{}.{}",
        patient_id,
        document_type.category(),
        Uuid::new_v4(),
        Utc::now().timestamp_millis(),
        extension.unwrap_or("bin")
    )
}

// ============================================================================
// S3
// ============================================================================

/// S3 (or S3-compatible) bucket
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from the ambient AWS environment plus config overrides
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = config.endpoint.as_deref() {
            info!(endpoint = endpoint, "Using custom S3 endpoint (path-style)");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::with_client(
            S3Client::from_conf(builder.build()),
            config.bucket.clone(),
        ))
    }

    /// Create with an existing client
    pub fn with_client(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

fn presigning(expires_in: Duration) -> Result<PresigningConfig> {
    PresigningConfig::expires_in(expires_in).map_err(|e| AppError::Storage {
        message: format!("Invalid presign expiry: {}", e),
    })
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(&self, key: &str, content_type: &str, expires_in: Duration) -> Result<String> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning(expires_in)?)
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Failed to presign upload: {}", e),
            })?;

        Ok(request.uri().to_string())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning(expires_in)?)
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Failed to presign download: {}", e),
            })?;

        Ok(request.uri().to_string())
    }

    async fn put_object(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<()> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Failed to store {}: {}", key, e),
            })?;

        debug!(key = key, size = size, "Object stored");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = match e.as_service_error() {
                    Some(service) if service.is_no_such_key() => "object does not exist".to_string(),
                    _ => e.to_string(),
                };
                AppError::StorageRead {
                    key: key.to_string(),
                    message,
                }
            })?;

        let body = output.body.collect().await.map_err(|e| AppError::StorageRead {
            key: key.to_string(),
            message: format!("Failed to read body: {}", e),
        })?;

        Ok(body.into_bytes().to_vec())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Failed to delete {}: {}", key, e),
            })?;

        debug!(key = key, "Object deleted");
        Ok(())
    }
}

// ============================================================================
// In-process
// ============================================================================

/// Map-backed store; signed URLs are opaque `memory://` strings
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
    fail_deletes: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delete fail
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|(ct, _)| ct.clone())
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn presign_put(&self, key: &str, _content_type: &str, expires_in: Duration) -> Result<String> {
        Ok(format!("memory://put/{}?expires={}", key, expires_in.as_secs()))
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        Ok(format!("memory://get/{}?expires={}", key, expires_in.as_secs()))
    }

    async fn put_object(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (content_type.to_string(), bytes));
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| AppError::StorageRead {
                key: key.to_string(),
                message: "object does not exist".to_string(),
            })
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Storage {
                message: format!("Failed to delete {}: injected failure", key),
            });
        }
        self.objects.write().await.remove(key);
        Ok(())
    }
}

/// Build the configured object store
pub async fn create_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.provider.as_str() {
        "s3" => Ok(Arc::new(S3ObjectStore::from_config(config).await?)),
        "memory" => Ok(Arc::new(MemoryObjectStore::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown storage provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_layout() {
        let patient = Uuid::new_v4();
        let key = storage_key(patient, DocumentType::UserUploaded, Some("pdf"));
        let prefix = format!("patients/{}/documents/", patient);
        assert!(key.starts_with(&prefix));
        assert!(key.ends_with(".pdf"));

        let report = storage_key(patient, DocumentType::AiAnalysisReport, Some("pdf"));
        assert!(report.contains("/reports/"));
        assert_ne!(key, report);
    }

    #[tokio::test]
    async fn test_memory_round_trip_and_missing() {
        let store = MemoryObjectStore::new();
        store.put_object("a/b.txt", "text/plain", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get_object("a/b.txt").await.unwrap(), b"hello");

        store.delete_object("a/b.txt").await.unwrap();
        let err = store.get_object("a/b.txt").await.unwrap_err();
        assert!(matches!(err, AppError::StorageRead { .. }));
    }

    #[tokio::test]
    async fn test_injected_delete_failure_keeps_object() {
        let store = MemoryObjectStore::new();
        store.put_object("k", "application/pdf", vec![1]).await.unwrap();
        store.fail_deletes(true);
        assert!(store.delete_object("k").await.is_err());
        assert!(store.contains("k").await);
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let config = StorageConfig {
            provider: "ftp".to_string(),
            ..crate::config::AppConfig::default().storage
        };
        assert!(create_object_store(&config).await.is_err());
    }
}
