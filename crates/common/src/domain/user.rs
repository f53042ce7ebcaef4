//! Users, roles and the doctor hierarchy

use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Staff role; every permission decision keys off this
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    SeniorDoctor,
    ConsultingDoctor,
    FrontDeskCoordinator,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Admin,
        Role::SeniorDoctor,
        Role::ConsultingDoctor,
        Role::FrontDeskCoordinator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SeniorDoctor => "senior_doctor",
            Role::ConsultingDoctor => "consulting_doctor",
            Role::FrontDeskCoordinator => "front_desk_coordinator",
        }
    }

    /// Doctors can own patients
    pub fn is_doctor(&self) -> bool {
        matches!(self, Role::SeniorDoctor | Role::ConsultingDoctor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "senior_doctor" => Ok(Role::SeniorDoctor),
            "consulting_doctor" => Ok(Role::ConsultingDoctor),
            "front_desk_coordinator" => Ok(Role::FrontDeskCoordinator),
            other => Err(AppError::validation("role", format!("Unknown role: {}", other))),
        }
    }
}

/// A staff account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,

    /// Back-reference held by a consulting doctor
    pub assigned_senior_doctor: Option<Uuid>,

    /// Children held by a senior doctor
    pub assigned_consulting_doctors: BTreeSet<Uuid>,

    pub assigned_patients: BTreeSet<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(email: &str, name: &str, role: Role, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            name: name.trim().to_string(),
            role,
            password_hash,
            is_active: true,
            assigned_senior_doctor: None,
            assigned_consulting_doctors: BTreeSet::new(),
            assigned_patients: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when `other` reports to this senior doctor
    pub fn supervises(&self, other: Uuid) -> bool {
        self.role == Role::SeniorDoctor && self.assigned_consulting_doctors.contains(&other)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Emails are compared case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
