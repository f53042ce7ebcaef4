//! End-to-end flows over the in-process backends

use crate::analysis::{ReportContext, ReportRenderer};
use crate::auth::{hash_password, JwtManager};
use crate::config::AppConfig;
use crate::db::{AnalysisStore, MemoryStore, UploadStore, UserStore};
use crate::domain::{AnalysisStatus, DocumentType, Patient, Role, UploadStatus, User};
use crate::errors::{AppError, Result};
use crate::identity::NewUser;
use crate::inference::{MockInference, MockReply};
use crate::patients::NewPatient;
use crate::services::Services;
use crate::storage::{MemoryObjectStore, ObjectStore};
use crate::uploads::FileDescriptor;
use std::sync::Arc;
use std::time::Duration;

const GENERATION: &str = "Finding: mild inflammation noted. Recommend follow-up in 2 weeks.";

struct Clinic {
    services: Services,
    store: Arc<MemoryStore>,
    objects: Arc<MemoryObjectStore>,
    admin: User,
    s1: User,
    c1: User,
    fd1: User,
}

async fn clinic(script: Vec<MockReply>) -> Clinic {
    let mut config = AppConfig::default();
    config.inference.timeout_secs = 1;

    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let inference = Arc::new(MockInference::with_script(GENERATION, script));
    let services = Services::new(
        &config,
        store.clone(),
        objects.clone(),
        inference,
        Arc::new(JwtManager::new("scenario-secret", 3600)),
    )
    .unwrap();

    let admin = User::new("admin@clinic.test", "Admin", Role::Admin, hash_password("admin-pass").unwrap());
    store.insert_user(&admin).await.unwrap();

    let register = |email: &str, role: Role, senior: Option<uuid::Uuid>| NewUser {
        email: email.to_string(),
        name: email.split('@').next().unwrap_or_default().to_string(),
        password: "clinic-pass".to_string(),
        role,
        assigned_senior_doctor: senior,
    };
    let s1 = services
        .identity
        .register_user(&admin, register("s1@clinic.test", Role::SeniorDoctor, None))
        .await
        .unwrap();
    let c1 = services
        .identity
        .register_user(&admin, register("c1@clinic.test", Role::ConsultingDoctor, Some(s1.id)))
        .await
        .unwrap();
    let fd1 = services
        .identity
        .register_user(&admin, register("fd1@clinic.test", Role::FrontDeskCoordinator, None))
        .await
        .unwrap();

    Clinic {
        services,
        store,
        objects,
        admin,
        s1,
        c1,
        fd1,
    }
}

async fn fresh(clinic: &Clinic, id: uuid::Uuid) -> User {
    clinic.store.find_user(id).await.unwrap().unwrap()
}

/// p1 created by fd1, then handed to c1 by the senior doctor
async fn patient_for_c1(clinic: &Clinic) -> Patient {
    let p1 = clinic
        .services
        .patients
        .create_patient(
            &clinic.fd1,
            NewPatient {
                first_name: "Pat".into(),
                last_name: "One".into(),
                ..NewPatient::default()
            },
        )
        .await
        .unwrap();
    clinic
        .services
        .patients
        .assign_doctor(&clinic.s1, p1.id, clinic.c1.id)
        .await
        .unwrap()
}

/// Slot issued to c1, bytes PUT by the client, then confirmed
async fn confirmed_upload(clinic: &Clinic, patient: &Patient) -> uuid::Uuid {
    let c1 = fresh(clinic, clinic.c1.id).await;
    let body = b"Chest X-ray narrative. Mild inflammation around the left lobe.".to_vec();
    let slot = clinic
        .services
        .uploads
        .issue_upload_slot(
            &c1,
            patient.id,
            FileDescriptor {
                file_name: "xray-notes.txt".into(),
                content_type: "text/plain".into(),
                size_bytes: body.len() as u64,
            },
        )
        .await
        .unwrap();
    clinic
        .objects
        .put_object(&slot.record.storage_key, "text/plain", body)
        .await
        .unwrap();
    clinic.services.uploads.confirm_upload(slot.record.id, &c1).await.unwrap();
    slot.record.id
}

#[tokio::test]
async fn test_registering_consulting_doctor_links_senior_once() {
    let clinic = clinic(Vec::new()).await;
    let s1 = fresh(&clinic, clinic.s1.id).await;
    let c1 = fresh(&clinic, clinic.c1.id).await;

    assert_eq!(c1.assigned_senior_doctor, Some(s1.id));
    assert_eq!(s1.assigned_consulting_doctors.len(), 1);
    assert!(s1.assigned_consulting_doctors.contains(&c1.id));

    clinic
        .services
        .identity
        .assign_senior(&clinic.admin, c1.id, s1.id)
        .await
        .unwrap();
    assert_eq!(fresh(&clinic, s1.id).await.assigned_consulting_doctors.len(), 1);
}

#[tokio::test]
async fn test_coordinator_sees_own_patient_unassigned_doctor_does_not() {
    let clinic = clinic(Vec::new()).await;
    let p1 = clinic
        .services
        .patients
        .create_patient(
            &clinic.fd1,
            NewPatient {
                first_name: "Pat".into(),
                last_name: "One".into(),
                ..NewPatient::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(p1.created_by, clinic.fd1.id);
    let seen = clinic.services.patients.get_patient(&clinic.fd1, p1.id).await.unwrap();
    assert_eq!(seen.id, p1.id);

    let err = clinic.services.patients.get_patient(&clinic.c1, p1.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));
}

#[tokio::test]
async fn test_confirm_is_idempotent() {
    let clinic = clinic(Vec::new()).await;
    let p1 = patient_for_c1(&clinic).await;
    let c1 = fresh(&clinic, clinic.c1.id).await;

    let upload_id = confirmed_upload(&clinic, &p1).await;
    let first = clinic.store.find_upload(upload_id).await.unwrap().unwrap();
    assert_eq!(first.status, UploadStatus::Completed);

    let second = clinic.services.uploads.confirm_upload(upload_id, &c1).await.unwrap();
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_analysis_extracts_findings_and_attaches_report() {
    let clinic = clinic(Vec::new()).await;
    let p1 = patient_for_c1(&clinic).await;
    let c1 = fresh(&clinic, clinic.c1.id).await;
    let upload_id = confirmed_upload(&clinic, &p1).await;

    let analysis = clinic.services.analyses.start_analysis(&c1, upload_id).await.unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Completed);
    let result = analysis.result.clone().unwrap();
    assert_eq!(result.key_findings, vec!["Finding: mild inflammation noted.".to_string()]);
    assert_eq!(result.recommendations, vec!["Recommend follow-up in 2 weeks.".to_string()]);

    let report_id = analysis.pdf_report_id.unwrap();
    let report = clinic.store.find_upload(report_id).await.unwrap().unwrap();
    assert_eq!(report.document_type, DocumentType::AiAnalysisReport);
    assert_eq!(report.status, UploadStatus::Completed);
    assert!(clinic.objects.contains(&report.storage_key).await);

    let first = clinic.services.analyses.get_analysis(&c1, &analysis.analysis_id).await.unwrap();
    let second = clinic.services.analyses.get_analysis(&c1, &analysis.analysis_id).await.unwrap();
    assert_eq!(first, analysis);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[tokio::test]
async fn test_inference_timeout_fails_without_report() {
    let clinic = clinic(vec![MockReply::Delay(Duration::from_secs(3), GENERATION.to_string())]).await;
    let p1 = patient_for_c1(&clinic).await;
    let c1 = fresh(&clinic, clinic.c1.id).await;
    let upload_id = confirmed_upload(&clinic, &p1).await;

    let analysis = clinic.services.analyses.start_analysis(&c1, upload_id).await.unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Failed);
    assert!(analysis.error_message.as_deref().is_some_and(|m| !m.is_empty()));
    assert!(analysis.result.is_none());
    assert!(analysis.pdf_report_id.is_none());

    let uploads = clinic.services.uploads.list_for_patient(&c1, p1.id).await.unwrap();
    assert_eq!(uploads.len(), 1);
    assert!(uploads.iter().all(|u| u.document_type == DocumentType::UserUploaded));
}

#[tokio::test]
async fn test_provider_error_is_recorded_not_raised() {
    let clinic = clinic(vec![MockReply::Fail {
        message: "model overloaded".to_string(),
        retryable: true,
    }])
    .await;
    let p1 = patient_for_c1(&clinic).await;
    let c1 = fresh(&clinic, clinic.c1.id).await;
    let upload_id = confirmed_upload(&clinic, &p1).await;

    let analysis = clinic.services.analyses.start_analysis(&c1, upload_id).await.unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Failed);
    assert!(analysis.error_message.unwrap().contains("model overloaded"));
}

#[tokio::test]
async fn test_concurrent_starts_create_independent_records() {
    let clinic = clinic(Vec::new()).await;
    let p1 = patient_for_c1(&clinic).await;
    let c1 = fresh(&clinic, clinic.c1.id).await;
    let upload_id = confirmed_upload(&clinic, &p1).await;

    let (a, b) = tokio::join!(
        clinic.services.analyses.start_analysis(&c1, upload_id),
        clinic.services.analyses.start_analysis(&c1, upload_id),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.analysis_id, b.analysis_id);

    let stored = clinic.services.analyses.list_for_patient(&c1, p1.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|x| x.status == AnalysisStatus::Completed));
    assert_ne!(a.pdf_report_id, b.pdf_report_id);
}

struct BrokenRenderer;

impl ReportRenderer for BrokenRenderer {
    fn render(&self, _context: &ReportContext<'_>) -> Result<Vec<u8>> {
        Err(AppError::ReportRender {
            message: "font table missing".to_string(),
        })
    }
}

#[tokio::test]
async fn test_report_failure_keeps_completed_analysis() {
    let mut clinic = clinic(Vec::new()).await;
    clinic.services.analyses = clinic.services.analyses.with_renderer(Arc::new(BrokenRenderer));
    let p1 = patient_for_c1(&clinic).await;
    let c1 = fresh(&clinic, clinic.c1.id).await;
    let upload_id = confirmed_upload(&clinic, &p1).await;

    let analysis = clinic.services.analyses.start_analysis(&c1, upload_id).await.unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Completed);
    assert!(analysis.pdf_report_id.is_none());

    let stored = clinic.store.find_analysis(&analysis.analysis_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AnalysisStatus::Completed);
}

#[tokio::test]
async fn test_reassignment_revokes_upload_access() {
    let clinic = clinic(Vec::new()).await;
    let p1 = patient_for_c1(&clinic).await;
    let upload_id = confirmed_upload(&clinic, &p1).await;

    clinic
        .services
        .patients
        .assign_doctor(&clinic.admin, p1.id, clinic.s1.id)
        .await
        .unwrap();
    let c1 = fresh(&clinic, clinic.c1.id).await;

    let err = clinic.services.uploads.download_url(upload_id, &c1).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));
    let err = clinic.services.analyses.start_analysis(&c1, upload_id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));
}
