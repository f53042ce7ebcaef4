//! Patient handlers

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use medvault_common::{
    domain::{Patient, PatientNote, PatientStatus},
    errors::Result,
    patients::NewPatient,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{created, ok, validate, Reply};
use crate::{extract::CurrentUser, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePatientRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100))]
    pub last_name: String,

    pub date_of_birth: Option<NaiveDate>,

    #[validate(length(max = 50))]
    pub gender: Option<String>,

    #[validate(length(max = 50))]
    pub phone: Option<String>,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(max = 500))]
    pub address: Option<String>,

    #[serde(default)]
    pub medical_history: Vec<String>,

    #[serde(default)]
    pub allergies: Vec<String>,

    pub assigned_doctor: Option<Uuid>,
}

impl From<CreatePatientRequest> for NewPatient {
    fn from(request: CreatePatientRequest) -> Self {
        NewPatient {
            first_name: request.first_name,
            last_name: request.last_name,
            date_of_birth: request.date_of_birth,
            gender: request.gender,
            phone: request.phone,
            email: request.email,
            address: request.address,
            medical_history: request.medical_history,
            allergies: request.allergies,
            assigned_doctor: request.assigned_doctor,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignDoctorRequest {
    pub doctor_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: PatientStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NoteRequest {
    #[validate(length(min = 1, max = 5000))]
    pub body: String,
}

pub async fn create_patient(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Json(request): Json<CreatePatientRequest>,
) -> Result<Reply<Patient>> {
    validate(&request)?;
    let patient = state
        .services
        .patients
        .create_patient(&requester, request.into())
        .await?;
    Ok(created("Patient created", patient))
}

pub async fn list_patients(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
) -> Result<Reply<Vec<Patient>>> {
    let patients = state.services.patients.list_patients(&requester).await?;
    Ok(ok(format!("{} patients", patients.len()), patients))
}

pub async fn get_patient(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(patient_id): Path<Uuid>,
) -> Result<Reply<Patient>> {
    let patient = state.services.patients.get_patient(&requester, patient_id).await?;
    Ok(ok("Patient found", patient))
}

pub async fn assign_doctor(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<AssignDoctorRequest>,
) -> Result<Reply<Patient>> {
    let patient = state
        .services
        .patients
        .assign_doctor(&requester, patient_id, request.doctor_id)
        .await?;
    Ok(ok("Doctor assigned", patient))
}

pub async fn update_status(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> Result<Reply<Patient>> {
    let patient = state
        .services
        .patients
        .update_status(&requester, patient_id, request.status)
        .await?;
    Ok(ok("Status updated", patient))
}

pub async fn add_note(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<NoteRequest>,
) -> Result<Reply<PatientNote>> {
    validate(&request)?;
    let note = state
        .services
        .patients
        .add_note(&requester, patient_id, &request.body)
        .await?;
    Ok(created("Note added", note))
}
