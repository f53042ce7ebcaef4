//! In-process record store
//!
//! Backs tests and `memory://` development runs. Enforces the same unique
//! keys as the Postgres schema so duplicate handling behaves identically.

use super::store::{AnalysisStore, PatientFilter, PatientStore, UploadStore, UserStore};
use crate::domain::{AiAnalysis, AnalysisStatus, Patient, Role, UploadRecord, User};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    patients: RwLock<HashMap<Uuid, Patient>>,
    uploads: RwLock<HashMap<Uuid, UploadRecord>>,
    analyses: RwLock<HashMap<String, AiAnalysis>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(resource_type: &str, id: impl ToString) -> AppError {
    AppError::NotFound {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::Duplicate {
                message: format!("email {} already registered", user.email),
            });
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(missing("user", user.id)),
        }
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl PatientStore for MemoryStore {
    async fn insert_patient(&self, patient: &Patient) -> Result<()> {
        let mut patients = self.patients.write().await;
        if patients
            .values()
            .any(|p| p.patient_number == patient.patient_number)
        {
            return Err(AppError::Duplicate {
                message: format!("patient number {} already exists", patient.patient_number),
            });
        }
        patients.insert(patient.id, patient.clone());
        Ok(())
    }

    async fn update_patient(&self, patient: &Patient) -> Result<()> {
        let mut patients = self.patients.write().await;
        match patients.get_mut(&patient.id) {
            Some(existing) => {
                *existing = patient.clone();
                Ok(())
            }
            None => Err(missing("patient", patient.id)),
        }
    }

    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>> {
        Ok(self.patients.read().await.get(&id).cloned())
    }

    async fn list_patients(&self, filter: PatientFilter) -> Result<Vec<Patient>> {
        let mut patients: Vec<Patient> = self
            .patients
            .read()
            .await
            .values()
            .filter(|p| match filter {
                PatientFilter::All => true,
                PatientFilter::AssignedTo(doctor) => p.assigned_doctor == Some(doctor),
                PatientFilter::CreatedBy(creator) => p.created_by == creator,
            })
            .cloned()
            .collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(patients)
    }
}

#[async_trait]
impl UploadStore for MemoryStore {
    async fn insert_upload(&self, upload: &UploadRecord) -> Result<()> {
        let mut uploads = self.uploads.write().await;
        if uploads.values().any(|u| u.storage_key == upload.storage_key) {
            return Err(AppError::Duplicate {
                message: format!("storage key {} already recorded", upload.storage_key),
            });
        }
        uploads.insert(upload.id, upload.clone());
        Ok(())
    }

    async fn update_upload(&self, upload: &UploadRecord) -> Result<()> {
        let mut uploads = self.uploads.write().await;
        match uploads.get_mut(&upload.id) {
            Some(existing) => {
                *existing = upload.clone();
                Ok(())
            }
            None => Err(missing("upload", upload.id)),
        }
    }

    async fn find_upload(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        Ok(self.uploads.read().await.get(&id).cloned())
    }

    async fn list_uploads_for_patient(&self, patient_id: Uuid) -> Result<Vec<UploadRecord>> {
        let mut uploads: Vec<UploadRecord> = self
            .uploads
            .read()
            .await
            .values()
            .filter(|u| u.patient_id == patient_id)
            .cloned()
            .collect();
        uploads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(uploads)
    }

    async fn delete_upload(&self, id: Uuid) -> Result<bool> {
        Ok(self.uploads.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn insert_analysis(&self, analysis: &AiAnalysis) -> Result<()> {
        let mut analyses = self.analyses.write().await;
        if analyses.contains_key(&analysis.analysis_id) {
            return Err(AppError::Duplicate {
                message: format!("analysis {} already exists", analysis.analysis_id),
            });
        }
        analyses.insert(analysis.analysis_id.clone(), analysis.clone());
        Ok(())
    }

    async fn update_analysis_from(&self, analysis: &AiAnalysis, expected: AnalysisStatus) -> Result<bool> {
        let mut analyses = self.analyses.write().await;
        match analyses.get_mut(&analysis.analysis_id) {
            Some(existing) if existing.status == expected => {
                *existing = analysis.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(missing("analysis", &analysis.analysis_id)),
        }
    }

    async fn find_analysis(&self, analysis_id: &str) -> Result<Option<AiAnalysis>> {
        Ok(self.analyses.read().await.get(analysis_id).cloned())
    }

    async fn list_analyses_for_patient(&self, patient_id: Uuid) -> Result<Vec<AiAnalysis>> {
        let mut analyses: Vec<AiAnalysis> = self
            .analyses
            .read()
            .await
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        analyses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(analyses)
    }

    async fn list_processing_started_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<AiAnalysis>> {
        Ok(self
            .analyses
            .read()
            .await
            .values()
            .filter(|a| a.status == AnalysisStatus::Processing && a.is_stale(cutoff))
            .cloned()
            .collect())
    }
}
