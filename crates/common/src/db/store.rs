//! Persistence seams
//!
//! The lifecycles talk to these traits only. [`super::Repository`] backs them
//! with Postgres, [`super::MemoryStore`] with in-process maps.

use crate::domain::{AiAnalysis, AnalysisStatus, Patient, Role, UploadRecord, User};
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Row filter for patient listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientFilter {
    All,
    AssignedTo(Uuid),
    CreatedBy(Uuid),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn update_user(&self, user: &User) -> Result<()>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;
    /// `email` is already normalized
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>>;
    async fn delete_user(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn insert_patient(&self, patient: &Patient) -> Result<()>;
    async fn update_patient(&self, patient: &Patient) -> Result<()>;
    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>>;
    async fn list_patients(&self, filter: PatientFilter) -> Result<Vec<Patient>>;
}

#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn insert_upload(&self, upload: &UploadRecord) -> Result<()>;
    async fn update_upload(&self, upload: &UploadRecord) -> Result<()>;
    async fn find_upload(&self, id: Uuid) -> Result<Option<UploadRecord>>;
    async fn list_uploads_for_patient(&self, patient_id: Uuid) -> Result<Vec<UploadRecord>>;
    async fn delete_upload(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn insert_analysis(&self, analysis: &AiAnalysis) -> Result<()>;
    /// Write `analysis` only while the stored status is still `expected`.
    ///
    /// Returns `false` when another writer moved the record first; nothing
    /// is written in that case.
    async fn update_analysis_from(&self, analysis: &AiAnalysis, expected: AnalysisStatus) -> Result<bool>;
    async fn find_analysis(&self, analysis_id: &str) -> Result<Option<AiAnalysis>>;
    async fn list_analyses_for_patient(&self, patient_id: Uuid) -> Result<Vec<AiAnalysis>>;
    async fn list_processing_started_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<AiAnalysis>>;
}

/// Everything the services need from persistence
pub trait RecordStore: UserStore + PatientStore + UploadStore + AnalysisStore {}

impl<T> RecordStore for T where T: UserStore + PatientStore + UploadStore + AnalysisStore {}
