//! Access control
//!
//! One [`AccessPolicy`] per role, consumed by every operation that touches
//! another user or a patient. Decisions are pure functions of already-loaded
//! records: no I/O, no hidden state, never an error. Callers check existence
//! first and turn [`Access::Deny`] into `Forbidden` via [`authorize_user`] /
//! [`authorize_patient`].

use crate::domain::{Patient, Role, User};
use crate::errors::{AppError, Result};
use crate::metrics;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

impl Access {
    pub fn is_allowed(self) -> bool {
        self == Access::Allow
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Access::Allow
        } else {
            Access::Deny
        }
    }
}

/// Role-specific access rules
pub trait AccessPolicy: Send + Sync {
    /// May `requester` read the account `target`?
    fn can_access_user(&self, requester: &User, target: Uuid) -> Access;

    /// May `requester` read or act on `patient`?
    fn can_access_patient(&self, requester: &User, patient: &Patient) -> Access;
}

pub struct AdminPolicy;

impl AccessPolicy for AdminPolicy {
    fn can_access_user(&self, _requester: &User, _target: Uuid) -> Access {
        Access::Allow
    }

    fn can_access_patient(&self, _requester: &User, _patient: &Patient) -> Access {
        Access::Allow
    }
}

pub struct SeniorDoctorPolicy;

impl AccessPolicy for SeniorDoctorPolicy {
    fn can_access_user(&self, requester: &User, target: Uuid) -> Access {
        Access::from_bool(target == requester.id || requester.supervises(target))
    }

    // TODO: restrict to patients of supervised consulting doctors if product
    // confirms that scope.
    fn can_access_patient(&self, _requester: &User, _patient: &Patient) -> Access {
        Access::Allow
    }
}

pub struct ConsultingDoctorPolicy;

impl AccessPolicy for ConsultingDoctorPolicy {
    fn can_access_user(&self, requester: &User, target: Uuid) -> Access {
        Access::from_bool(target == requester.id)
    }

    fn can_access_patient(&self, requester: &User, patient: &Patient) -> Access {
        Access::from_bool(patient.is_assigned_to(requester.id))
    }
}

pub struct FrontDeskPolicy;

impl AccessPolicy for FrontDeskPolicy {
    fn can_access_user(&self, _requester: &User, _target: Uuid) -> Access {
        Access::Deny
    }

    /// Coordinators own the patients they registered
    fn can_access_patient(&self, requester: &User, patient: &Patient) -> Access {
        Access::from_bool(patient.created_by == requester.id)
    }
}

static ADMIN: AdminPolicy = AdminPolicy;
static SENIOR_DOCTOR: SeniorDoctorPolicy = SeniorDoctorPolicy;
static CONSULTING_DOCTOR: ConsultingDoctorPolicy = ConsultingDoctorPolicy;
static FRONT_DESK: FrontDeskPolicy = FrontDeskPolicy;

/// Policy for a role
pub fn policy_for(role: Role) -> &'static dyn AccessPolicy {
    match role {
        Role::Admin => &ADMIN,
        Role::SeniorDoctor => &SENIOR_DOCTOR,
        Role::ConsultingDoctor => &CONSULTING_DOCTOR,
        Role::FrontDeskCoordinator => &FRONT_DESK,
    }
}

pub fn can_access_user(requester: &User, target: Uuid) -> Access {
    policy_for(requester.role).can_access_user(requester, target)
}

pub fn can_access_patient(requester: &User, patient: &Patient) -> Access {
    policy_for(requester.role).can_access_patient(requester, patient)
}

/// `Forbidden` unless the requester may read `target`
pub fn authorize_user(requester: &User, target: Uuid) -> Result<()> {
    let decision = can_access_user(requester, target);
    metrics::record_access_decision("user", requester.role, decision.is_allowed());
    if decision.is_allowed() {
        Ok(())
    } else {
        tracing::debug!(requester = %requester.id, target = %target, "User access denied");
        Err(AppError::forbidden("You do not have access to this user"))
    }
}

/// `Forbidden` unless the requester may act on `patient`
pub fn authorize_patient(requester: &User, patient: &Patient) -> Result<()> {
    let decision = can_access_patient(requester, patient);
    metrics::record_access_decision("patient", requester.role, decision.is_allowed());
    if decision.is_allowed() {
        Ok(())
    } else {
        tracing::debug!(requester = %requester.id, patient = %patient.id, "Patient access denied");
        Err(AppError::forbidden("You do not have access to this patient"))
    }
}

/// `Forbidden` unless the requester holds one of `roles`
pub fn require_role(requester: &User, roles: &[Role]) -> Result<()> {
    if roles.contains(&requester.role) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "Role {} may not perform this operation",
            requester.role
        )))
    }
}
