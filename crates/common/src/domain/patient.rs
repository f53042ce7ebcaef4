//! Patient records and intake notes

use crate::errors::AppError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::user::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Active,
    Inactive,
    Discharged,
}

impl PatientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientStatus::Active => "active",
            PatientStatus::Inactive => "inactive",
            PatientStatus::Discharged => "discharged",
        }
    }
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatientStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PatientStatus::Active),
            "inactive" => Ok(PatientStatus::Inactive),
            "discharged" => Ok(PatientStatus::Discharged),
            other => Err(AppError::validation("status", format!("Unknown patient status: {}", other))),
        }
    }
}

/// Timeline entry written by staff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientNote {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_role: Role,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Demographics supplied at intake
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,

    /// Human-facing unique number, `PAT-YYYYMMDD-XXXXXX`
    pub patient_number: String,

    #[serde(flatten)]
    pub demographics: Demographics,

    pub medical_history: Vec<String>,
    pub allergies: Vec<String>,

    /// At most one owning doctor; reassignment replaces it
    pub assigned_doctor: Option<Uuid>,

    pub created_by: Uuid,
    pub status: PatientStatus,
    pub notes: Vec<PatientNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn new(demographics: Demographics, created_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_number: generate_patient_number(now),
            demographics,
            medical_history: Vec::new(),
            allergies: Vec::new(),
            assigned_doctor: None,
            created_by,
            status: PatientStatus::Active,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.demographics.first_name.trim(),
            self.demographics.last_name.trim()
        )
        .trim()
        .to_string()
    }

    /// Age in whole years on the given date
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let dob = self.demographics.date_of_birth?;
        let mut years = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    pub fn is_assigned_to(&self, doctor_id: Uuid) -> bool {
        self.assigned_doctor == Some(doctor_id)
    }

    pub fn add_note(&mut self, author: &User, body: &str) -> &PatientNote {
        let now = Utc::now();
        self.notes.push(PatientNote {
            id: Uuid::new_v4(),
            author_id: author.id,
            author_role: author.role,
            body: body.trim().to_string(),
            created_at: now,
        });
        self.updated_at = now;
        &self.notes[self.notes.len() - 1]
    }
}

fn generate_patient_number(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("PAT-{}-{:06}", now.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> Demographics {
        Demographics {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 6, 15),
            ..Default::default()
        }
    }

    #[test]
    fn test_patient_number_format() {
        let patient = Patient::new(demo(), Uuid::new_v4());
        assert!(patient.patient_number.starts_with("PAT-"));
        assert_eq!(patient.patient_number.len(), "PAT-20260101-000000".len());
        assert_eq!(patient.status, PatientStatus::Active);
        assert!(patient.assigned_doctor.is_none());
    }

    #[test]
    fn test_age_on_respects_birthday() {
        let patient = Patient::new(demo(), Uuid::new_v4());
        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2020, 6, 14).unwrap()), Some(29));
        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2020, 6, 15).unwrap()), Some(30));
    }

    #[test]
    fn test_full_name() {
        let patient = Patient::new(demo(), Uuid::new_v4());
        assert_eq!(patient.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_add_note_records_author() {
        let author = User::new("fd@clinic.test", "Desk", Role::FrontDeskCoordinator, String::new());
        let mut patient = Patient::new(demo(), author.id);
        let note = patient.add_note(&author, "  walk-in, mild fever ").clone();
        assert_eq!(note.body, "walk-in, mild fever");
        assert_eq!(note.author_role, Role::FrontDeskCoordinator);
        assert_eq!(patient.notes.len(), 1);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("discharged".parse::<PatientStatus>().unwrap(), PatientStatus::Discharged);
        assert!("deleted".parse::<PatientStatus>().is_err());
    }
}
