//! Patient records and doctor ownership
//!
//! A patient has at most one assigned doctor. The doctor's
//! `assigned_patients` set mirrors that field and moves with it on
//! reassignment.

use crate::access::{authorize_patient, require_role};
use crate::db::{PatientFilter, RecordStore};
use crate::domain::{Demographics, Patient, PatientNote, PatientStatus, Role, User};
use crate::errors::{AppError, Result};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Intake form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub medical_history: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub assigned_doctor: Option<Uuid>,
}

pub struct PatientService {
    store: Arc<dyn RecordStore>,
}

impl PatientService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Any staff member may register a patient; they become its creator
    #[instrument(skip(self, requester, intake), fields(requester = %requester.id))]
    pub async fn create_patient(&self, requester: &User, intake: NewPatient) -> Result<Patient> {
        if intake.first_name.trim().is_empty() {
            return Err(AppError::validation("first_name", "First name is required"));
        }
        if intake.last_name.trim().is_empty() {
            return Err(AppError::validation("last_name", "Last name is required"));
        }
        let doctor = match intake.assigned_doctor {
            Some(id) => Some(self.load_assignable_doctor(id).await?),
            None => None,
        };

        let mut patient = Patient::new(
            Demographics {
                first_name: intake.first_name.trim().to_string(),
                last_name: intake.last_name.trim().to_string(),
                date_of_birth: intake.date_of_birth,
                gender: intake.gender,
                phone: intake.phone,
                email: intake.email,
                address: intake.address,
            },
            requester.id,
        );
        patient.medical_history = intake.medical_history;
        patient.allergies = intake.allergies;
        patient.assigned_doctor = doctor.as_ref().map(|d| d.id);
        self.store.insert_patient(&patient).await?;

        if let Some(mut doctor) = doctor {
            doctor.assigned_patients.insert(patient.id);
            doctor.touch();
            self.store.update_user(&doctor).await?;
        }

        info!(patient_id = %patient.id, patient_number = %patient.patient_number, "Patient created");
        Ok(patient)
    }

    /// Existence is checked before access
    pub async fn get_patient(&self, requester: &User, patient_id: Uuid) -> Result<Patient> {
        let patient = self.load_patient(patient_id).await?;
        authorize_patient(requester, &patient)?;
        Ok(patient)
    }

    pub async fn list_patients(&self, requester: &User) -> Result<Vec<Patient>> {
        let filter = match requester.role {
            Role::Admin | Role::SeniorDoctor => PatientFilter::All,
            Role::ConsultingDoctor => PatientFilter::AssignedTo(requester.id),
            Role::FrontDeskCoordinator => PatientFilter::CreatedBy(requester.id),
        };
        self.store.list_patients(filter).await
    }

    /// Move a patient to another doctor
    pub async fn assign_doctor(&self, requester: &User, patient_id: Uuid, doctor_id: Uuid) -> Result<Patient> {
        require_role(requester, &[Role::Admin, Role::SeniorDoctor])?;
        let mut patient = self.get_patient(requester, patient_id).await?;

        if patient.assigned_doctor == Some(doctor_id) {
            return Err(AppError::Conflict {
                message: "Patient is already assigned to this doctor".to_string(),
            });
        }
        let mut doctor = self.load_assignable_doctor(doctor_id).await?;

        if let Some(previous_id) = patient.assigned_doctor {
            if let Some(mut previous) = self.store.find_user(previous_id).await? {
                if previous.assigned_patients.remove(&patient.id) {
                    previous.touch();
                    self.store.update_user(&previous).await?;
                }
            }
        }

        patient.assigned_doctor = Some(doctor.id);
        patient.updated_at = Utc::now();
        self.store.update_patient(&patient).await?;

        doctor.assigned_patients.insert(patient.id);
        doctor.touch();
        self.store.update_user(&doctor).await?;

        info!(patient_id = %patient.id, doctor_id = %doctor.id, "Doctor assigned");
        Ok(patient)
    }

    /// Doctors with access and admins; coordinators are refused
    pub async fn update_status(&self, requester: &User, patient_id: Uuid, status: PatientStatus) -> Result<Patient> {
        require_role(
            requester,
            &[Role::Admin, Role::SeniorDoctor, Role::ConsultingDoctor],
        )?;
        let mut patient = self.get_patient(requester, patient_id).await?;

        if patient.status != status {
            patient.status = status;
            patient.updated_at = Utc::now();
            self.store.update_patient(&patient).await?;
            info!(patient_id = %patient.id, status = %status, "Patient status updated");
        }
        Ok(patient)
    }

    pub async fn add_note(&self, requester: &User, patient_id: Uuid, body: &str) -> Result<PatientNote> {
        if body.trim().is_empty() {
            return Err(AppError::validation("body", "Note must not be empty"));
        }
        let mut patient = self.get_patient(requester, patient_id).await?;
        let note = patient.add_note(requester, body).clone();
        self.store.update_patient(&patient).await?;
        Ok(note)
    }

    async fn load_patient(&self, id: Uuid) -> Result<Patient> {
        self.store
            .find_patient(id)
            .await?
            .ok_or_else(|| AppError::PatientNotFound { id: id.to_string() })
    }

    async fn load_assignable_doctor(&self, id: Uuid) -> Result<User> {
        match self.store.find_user(id).await? {
            Some(user) if user.role.is_doctor() && user.is_active => Ok(user),
            _ => Err(AppError::InvalidReference {
                message: format!("{} is not an active doctor", id),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, PatientStore, UserStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        service: PatientService,
        admin: User,
        senior: User,
        consulting: User,
        desk: User,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let service = PatientService::new(store.clone());
        let admin = User::new("admin@clinic.test", "Admin", Role::Admin, String::new());
        let senior = User::new("senior@clinic.test", "Senior", Role::SeniorDoctor, String::new());
        let consulting = User::new("consult@clinic.test", "Consult", Role::ConsultingDoctor, String::new());
        let desk = User::new("desk@clinic.test", "Desk", Role::FrontDeskCoordinator, String::new());
        for user in [&admin, &senior, &consulting, &desk] {
            store.insert_user(user).await.unwrap();
        }
        Fixture {
            store,
            service,
            admin,
            senior,
            consulting,
            desk,
        }
    }

    fn intake(doctor: Option<Uuid>) -> NewPatient {
        NewPatient {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            assigned_doctor: doctor,
            ..NewPatient::default()
        }
    }

    #[tokio::test]
    async fn test_create_links_doctor() {
        let fx = fixture().await;
        let patient = fx
            .service
            .create_patient(&fx.desk, intake(Some(fx.consulting.id)))
            .await
            .unwrap();

        assert_eq!(patient.created_by, fx.desk.id);
        let doctor = fx.store.find_user(fx.consulting.id).await.unwrap().unwrap();
        assert!(doctor.assigned_patients.contains(&patient.id));
    }

    #[tokio::test]
    async fn test_create_rejects_non_doctor_assignment() {
        let fx = fixture().await;
        let err = fx
            .service
            .create_patient(&fx.desk, intake(Some(fx.desk.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn test_not_found_before_forbidden() {
        let fx = fixture().await;
        let err = fx.service.get_patient(&fx.consulting, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::PatientNotFound { .. }));

        let patient = fx.service.create_patient(&fx.desk, intake(None)).await.unwrap();
        let err = fx.service.get_patient(&fx.consulting, patient.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_reassignment_moves_ownership() {
        let fx = fixture().await;
        let patient = fx
            .service
            .create_patient(&fx.desk, intake(Some(fx.consulting.id)))
            .await
            .unwrap();

        let err = fx
            .service
            .assign_doctor(&fx.admin, patient.id, fx.consulting.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));

        fx.service.assign_doctor(&fx.senior, patient.id, fx.senior.id).await.unwrap();
        let old = fx.store.find_user(fx.consulting.id).await.unwrap().unwrap();
        let new = fx.store.find_user(fx.senior.id).await.unwrap().unwrap();
        assert!(!old.assigned_patients.contains(&patient.id));
        assert!(new.assigned_patients.contains(&patient.id));
        assert!(matches!(
            fx.service.get_patient(&old, patient.id).await,
            Err(AppError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_scoping() {
        let fx = fixture().await;
        fx.service.create_patient(&fx.desk, intake(Some(fx.consulting.id))).await.unwrap();
        fx.service.create_patient(&fx.admin, intake(None)).await.unwrap();

        assert_eq!(fx.service.list_patients(&fx.senior).await.unwrap().len(), 2);
        assert_eq!(fx.service.list_patients(&fx.consulting).await.unwrap().len(), 1);
        assert_eq!(fx.service.list_patients(&fx.desk).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_and_notes() {
        let fx = fixture().await;
        let patient = fx
            .service
            .create_patient(&fx.desk, intake(Some(fx.consulting.id)))
            .await
            .unwrap();

        assert!(matches!(
            fx.service.update_status(&fx.desk, patient.id, PatientStatus::Discharged).await,
            Err(AppError::Forbidden { .. })
        ));
        let updated = fx
            .service
            .update_status(&fx.consulting, patient.id, PatientStatus::Discharged)
            .await
            .unwrap();
        assert_eq!(updated.status, PatientStatus::Discharged);

        let note = fx.service.add_note(&fx.desk, patient.id, "  Called family  ").await.unwrap();
        assert_eq!(note.body, "Called family");
        assert_eq!(note.author_role, Role::FrontDeskCoordinator);
        let stored = fx.store.find_patient(patient.id).await.unwrap().unwrap();
        assert_eq!(stored.notes.len(), 1);
    }
}
