//! Upload record lifecycle
//!
//! Two ways in:
//! - signed slot: the server records a `pending` upload and hands out a PUT
//!   URL; the uploader confirms (or reports failure) afterwards
//! - direct: the bytes pass through the server and the record is born
//!   `completed` with a checksum
//!
//! Deletion removes the stored object first and the record second, so a
//! storage failure never leaves a record pointing at nothing.

use crate::access::authorize_patient;
use crate::config::{StorageConfig, UploadConfig};
use crate::db::RecordStore;
use crate::domain::{file_extension, DocumentType, Patient, Transition, UploadRecord, UploadStatus, User};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::storage::{storage_key, ObjectStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Extension and MIME type pairs accepted for upload
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("txt", "text/plain"),
];

/// What the client says it is about to upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Type allow-list and size ceiling
#[derive(Debug, Clone)]
pub struct FilePolicy {
    max_size_bytes: u64,
}

impl FilePolicy {
    pub fn new(max_size_bytes: u64) -> Self {
        Self { max_size_bytes }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Check a descriptor; returns the normalized extension
    pub fn validate(&self, file: &FileDescriptor) -> Result<String> {
        for (field, value) in [("file_name", &file.file_name), ("content_type", &file.content_type)] {
            if value.trim().is_empty() {
                return Err(AppError::MissingField {
                    field: field.to_string(),
                });
            }
        }

        let mime = normalize_mime(&file.content_type);
        let extension = file_extension(&file.file_name)
            .filter(|ext| ALLOWED_TYPES.iter().any(|(e, m)| *e == ext.as_str() && *m == mime))
            .ok_or_else(|| AppError::InvalidFileType {
                content_type: file.content_type.clone(),
            })?;

        if file.size_bytes == 0 {
            return Err(AppError::validation("size_bytes", "File is empty"));
        }
        if file.size_bytes > self.max_size_bytes {
            return Err(AppError::PayloadTooLarge {
                size: file.size_bytes,
                limit: self.max_size_bytes,
            });
        }
        Ok(extension)
    }
}

/// `Text/Plain; charset=utf-8` -> `text/plain`
fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// A pending record plus the URL to PUT its bytes to
#[derive(Debug, Clone, Serialize)]
pub struct UploadSlot {
    pub record: UploadRecord,
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0))
}

pub struct UploadService {
    store: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    policy: FilePolicy,
    upload_url_ttl: Duration,
    download_url_ttl: Duration,
}

impl UploadService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        uploads: &UploadConfig,
        storage: &StorageConfig,
    ) -> Self {
        Self {
            store,
            objects,
            policy: FilePolicy::new(uploads.max_size_bytes),
            upload_url_ttl: Duration::from_secs(storage.upload_url_ttl_secs),
            download_url_ttl: Duration::from_secs(storage.download_url_ttl_secs),
        }
    }

    pub fn policy(&self) -> &FilePolicy {
        &self.policy
    }

    /// Validate, check the patient, record `pending`, sign a PUT URL
    #[instrument(skip(self, requester, file), fields(requester = %requester.id, file_name = %file.file_name))]
    pub async fn issue_upload_slot(
        &self,
        requester: &User,
        patient_id: Uuid,
        file: FileDescriptor,
    ) -> Result<UploadSlot> {
        let extension = self.policy.validate(&file)?;
        let patient = self.load_patient(patient_id).await?;
        authorize_patient(requester, &patient)?;

        let key = storage_key(patient.id, DocumentType::UserUploaded, Some(&extension));
        let upload_url = self
            .objects
            .presign_put(&key, &file.content_type, self.upload_url_ttl)
            .await?;

        let record = UploadRecord::pending(
            patient.id,
            key,
            &file.file_name,
            &normalize_mime(&file.content_type),
            file.size_bytes,
            requester.id,
        );
        self.store.insert_upload(&record).await?;
        metrics::record_upload_transition("pending");
        info!(upload_id = %record.id, "Upload slot issued");

        Ok(UploadSlot {
            record,
            upload_url,
            expires_at: expiry(self.upload_url_ttl),
        })
    }

    /// pending -> completed; confirming twice returns the same record
    pub async fn confirm_upload(&self, upload_id: Uuid, requester: &User) -> Result<UploadRecord> {
        let mut record = self.load_own_upload(upload_id, requester).await?;
        match record.complete(Utc::now())? {
            Transition::Applied => {
                self.store.update_upload(&record).await?;
                metrics::record_upload_transition("completed");
                info!(upload_id = %record.id, "Upload confirmed");
            }
            Transition::Unchanged => debug!(upload_id = %record.id, "Upload already confirmed"),
        }
        Ok(record)
    }

    /// Uploader reports that the PUT never succeeded
    pub async fn mark_failed(&self, upload_id: Uuid, requester: &User, reason: &str) -> Result<UploadRecord> {
        let mut record = self.load_own_upload(upload_id, requester).await?;
        if record.fail(reason)? == Transition::Applied {
            self.store.update_upload(&record).await?;
            metrics::record_upload_transition("failed");
            info!(upload_id = %record.id, reason = reason, "Upload marked failed");
        }
        Ok(record)
    }

    /// Store the bytes server-side and record a completed upload
    #[instrument(skip(self, requester, file, bytes), fields(requester = %requester.id, size = bytes.len()))]
    pub async fn direct_upload(
        &self,
        requester: &User,
        patient_id: Uuid,
        file: FileDescriptor,
        bytes: Vec<u8>,
    ) -> Result<UploadRecord> {
        let file = FileDescriptor {
            size_bytes: bytes.len() as u64,
            ..file
        };
        let extension = self.policy.validate(&file)?;
        let patient = self.load_patient(patient_id).await?;
        authorize_patient(requester, &patient)?;

        let key = storage_key(patient.id, DocumentType::UserUploaded, Some(&extension));
        let mime = normalize_mime(&file.content_type);
        let checksum = hex::encode(Sha256::digest(&bytes));
        self.objects.put_object(&key, &mime, bytes).await?;

        let mut record = UploadRecord::pending(patient.id, key, &file.file_name, &mime, file.size_bytes, requester.id);
        record.checksum = Some(checksum);
        record.complete(Utc::now())?;
        self.store.insert_upload(&record).await?;
        metrics::record_upload_transition("completed");
        info!(upload_id = %record.id, "Direct upload stored");

        Ok(record)
    }

    /// Uploader only; the object goes first, then the record
    pub async fn delete_upload(&self, upload_id: Uuid, requester: &User) -> Result<()> {
        let record = self.load_own_upload(upload_id, requester).await?;

        self.objects.delete_object(&record.storage_key).await?;
        if !self.store.delete_upload(record.id).await? {
            return Err(AppError::UploadNotFound {
                id: upload_id.to_string(),
            });
        }

        info!(upload_id = %record.id, "Upload deleted");
        Ok(())
    }

    /// Signed read URL for anyone with access to the patient
    pub async fn download_url(&self, upload_id: Uuid, requester: &User) -> Result<DownloadLink> {
        let record = self.load_upload(upload_id).await?;
        let patient = self.load_patient(record.patient_id).await?;
        authorize_patient(requester, &patient)?;

        if record.status != UploadStatus::Completed {
            return Err(AppError::Conflict {
                message: format!("upload {} is {}", record.id, record.status),
            });
        }

        let url = self
            .objects
            .presign_get(&record.storage_key, self.download_url_ttl)
            .await?;
        Ok(DownloadLink {
            url,
            expires_at: expiry(self.download_url_ttl),
        })
    }

    pub async fn list_for_patient(&self, requester: &User, patient_id: Uuid) -> Result<Vec<UploadRecord>> {
        let patient = self.load_patient(patient_id).await?;
        authorize_patient(requester, &patient)?;
        self.store.list_uploads_for_patient(patient.id).await
    }

    async fn load_upload(&self, id: Uuid) -> Result<UploadRecord> {
        self.store
            .find_upload(id)
            .await?
            .ok_or_else(|| AppError::UploadNotFound { id: id.to_string() })
    }

    async fn load_own_upload(&self, id: Uuid, requester: &User) -> Result<UploadRecord> {
        let record = self.load_upload(id).await?;
        if record.uploaded_by != requester.id {
            return Err(AppError::forbidden("Only the uploader may modify this upload"));
        }
        Ok(record)
    }

    async fn load_patient(&self, id: Uuid) -> Result<Patient> {
        self.store
            .find_patient(id)
            .await?
            .ok_or_else(|| AppError::PatientNotFound { id: id.to_string() })
    }
}
