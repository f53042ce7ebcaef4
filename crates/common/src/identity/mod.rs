//! Staff accounts and the doctor hierarchy
//!
//! Consulting doctors report to at most one senior doctor. The edge is
//! stored on both ends (`assigned_senior_doctor` on the child,
//! `assigned_consulting_doctors` on the parent) and every operation here
//! keeps the two in step.

use crate::access::{authorize_user, require_role};
use crate::auth::{hash_password, verify_password, JwtManager};
use crate::db::{PatientFilter, RecordStore};
use crate::domain::{normalize_email, Role, User};
use crate::errors::{AppError, Result};
use chrono::Utc;
use futures::future::try_join_all;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 8;

/// Registration input
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub assigned_senior_doctor: Option<Uuid>,
}

pub struct IdentityService {
    store: Arc<dyn RecordStore>,
    jwt: Arc<JwtManager>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn RecordStore>, jwt: Arc<JwtManager>) -> Self {
        Self { store, jwt }
    }

    /// Admin-only account creation
    #[instrument(skip(self, requester, new_user), fields(requester = %requester.id, role = %new_user.role))]
    pub async fn register_user(&self, requester: &User, new_user: NewUser) -> Result<User> {
        require_role(requester, &[Role::Admin])?;

        let email = normalize_email(&new_user.email);
        if !email.contains('@') {
            return Err(AppError::validation("email", "Email address is invalid"));
        }
        if new_user.name.trim().is_empty() {
            return Err(AppError::validation("name", "Name is required"));
        }
        if new_user.password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(
                "password",
                format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
            ));
        }
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::validation("email", "Email is already registered"));
        }

        if let Some(senior_id) = new_user.assigned_senior_doctor {
            if new_user.role != Role::ConsultingDoctor {
                return Err(AppError::InvalidReference {
                    message: "only consulting doctors report to a senior doctor".to_string(),
                });
            }
            let senior = self.store.find_user(senior_id).await?;
            if !senior.is_some_and(|s| s.role == Role::SeniorDoctor) {
                return Err(AppError::InvalidReference {
                    message: format!("{} is not a senior doctor", senior_id),
                });
            }
        }

        let user = User::new(&email, &new_user.name, new_user.role, hash_password(&new_user.password)?);
        self.store.insert_user(&user).await?;

        let Some(senior_id) = new_user.assigned_senior_doctor else {
            info!(user_id = %user.id, "User registered");
            return Ok(user);
        };

        // The senior may have changed since the check above; never keep a half-linked account
        match self.assign_consulting_to_senior(user.id, senior_id).await {
            Ok(linked) => {
                info!(user_id = %linked.id, senior = %senior_id, "User registered");
                Ok(linked)
            }
            Err(e) => {
                self.store.delete_user(user.id).await?;
                warn!(email = %email, error = %e, "Registration rolled back");
                Err(e)
            }
        }
    }

    /// Admin entry point for [`Self::assign_consulting_to_senior`]
    pub async fn assign_senior(&self, requester: &User, consulting_id: Uuid, senior_id: Uuid) -> Result<User> {
        require_role(requester, &[Role::Admin])?;
        self.assign_consulting_to_senior(consulting_id, senior_id).await
    }

    /// Link a consulting doctor to a senior doctor, both directions.
    ///
    /// A previous senior loses the child. Re-linking to the current senior
    /// changes nothing. Returns the updated consulting doctor.
    pub async fn assign_consulting_to_senior(&self, consulting_id: Uuid, senior_id: Uuid) -> Result<User> {
        let mut consulting = self.load_user(consulting_id).await?;
        let mut senior = self.load_user(senior_id).await?;

        if consulting.role != Role::ConsultingDoctor {
            return Err(AppError::InvalidReference {
                message: format!("{} is not a consulting doctor", consulting_id),
            });
        }
        if senior.role != Role::SeniorDoctor {
            return Err(AppError::InvalidReference {
                message: format!("{} is not a senior doctor", senior_id),
            });
        }

        if let Some(previous) = consulting.assigned_senior_doctor.filter(|p| *p != senior_id) {
            self.detach_from_senior(previous, consulting_id).await?;
        }

        if consulting.assigned_senior_doctor != Some(senior_id) {
            consulting.assigned_senior_doctor = Some(senior_id);
            consulting.touch();
            self.store.update_user(&consulting).await?;
        }
        if senior.assigned_consulting_doctors.insert(consulting_id) {
            senior.touch();
            self.store.update_user(&senior).await?;
        }

        info!(consulting = %consulting_id, senior = %senior_id, "Consulting doctor assigned");
        Ok(consulting)
    }

    /// Remove a consulting doctor from their senior, both directions
    pub async fn unassign_consulting(&self, requester: &User, consulting_id: Uuid) -> Result<User> {
        require_role(requester, &[Role::Admin])?;
        let mut consulting = self.load_user(consulting_id).await?;

        if let Some(senior_id) = consulting.assigned_senior_doctor.take() {
            self.detach_from_senior(senior_id, consulting_id).await?;
            consulting.touch();
            self.store.update_user(&consulting).await?;
            info!(consulting = %consulting_id, senior = %senior_id, "Consulting doctor unassigned");
        }
        Ok(consulting)
    }

    /// Change a role, dropping hierarchy edges the new role cannot hold.
    ///
    /// Leaving the doctor roles also releases every assigned patient.
    pub async fn change_role(&self, requester: &User, user_id: Uuid, role: Role) -> Result<User> {
        require_role(requester, &[Role::Admin])?;
        if requester.id == user_id {
            return Err(AppError::forbidden("Administrators cannot change their own role"));
        }

        let mut user = self.load_user(user_id).await?;
        if user.role == role {
            return Ok(user);
        }

        self.detach_hierarchy(&mut user).await?;
        if !role.is_doctor() {
            self.release_patients(user.id).await?;
            user.assigned_patients.clear();
        }
        let previous = user.role;
        user.role = role;
        user.touch();
        self.store.update_user(&user).await?;

        info!(user_id = %user.id, from = %previous, to = %role, "Role changed");
        Ok(user)
    }

    /// Soft activation switch; inactive accounts cannot authenticate
    pub async fn set_active(&self, requester: &User, user_id: Uuid, active: bool) -> Result<User> {
        require_role(requester, &[Role::Admin])?;
        if requester.id == user_id && !active {
            return Err(AppError::forbidden("Administrators cannot deactivate themselves"));
        }

        let mut user = self.load_user(user_id).await?;
        if user.is_active != active {
            user.is_active = active;
            user.touch();
            self.store.update_user(&user).await?;
            info!(user_id = %user.id, active, "Account activation changed");
        }
        Ok(user)
    }

    /// Hard delete; hierarchy edges and patient assignments are released first
    pub async fn delete_user(&self, requester: &User, user_id: Uuid) -> Result<()> {
        require_role(requester, &[Role::Admin])?;
        if requester.id == user_id {
            return Err(AppError::forbidden("Administrators cannot delete themselves"));
        }

        let mut user = self.load_user(user_id).await?;
        self.detach_hierarchy(&mut user).await?;
        self.release_patients(user.id).await?;

        if !self.store.delete_user(user.id).await? {
            return Err(AppError::UserNotFound {
                id: user_id.to_string(),
            });
        }
        info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    /// Email and password login; returns a bearer token and the account
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<(String, User)> {
        let invalid = || AppError::Unauthorized {
            message: "Invalid email or password".to_string(),
        };

        let mut user = self
            .store
            .find_user_by_email(&normalize_email(email))
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(password, &user.password_hash) {
            warn!(user_id = %user.id, "Failed login attempt");
            return Err(invalid());
        }
        if !user.is_active {
            return Err(AppError::AccountInactive);
        }

        user.last_login_at = Some(Utc::now());
        self.store.update_user(&user).await?;

        let token = self.jwt.generate_token(&user)?;
        info!(user_id = %user.id, "User logged in");
        Ok((token, user))
    }

    /// Resolve a bearer token to an active account
    pub async fn user_for_token(&self, token: &str) -> Result<User> {
        let claims = self.jwt.validate_token(token)?;
        let user = self
            .store
            .find_user(claims.user_id()?)
            .await?
            .ok_or(AppError::InvalidToken)?;
        if !user.is_active {
            return Err(AppError::AccountInactive);
        }
        Ok(user)
    }

    pub async fn get_user(&self, requester: &User, target_id: Uuid) -> Result<User> {
        let target = self.load_user(target_id).await?;
        authorize_user(requester, target.id)?;
        Ok(target)
    }

    /// Admin: everyone. Senior: self and supervised doctors. Others: self.
    pub async fn list_users(&self, requester: &User) -> Result<Vec<User>> {
        match requester.role {
            Role::Admin => self.store.list_users(None).await,
            Role::SeniorDoctor => {
                let children = try_join_all(
                    requester
                        .assigned_consulting_doctors
                        .iter()
                        .map(|id| self.store.find_user(*id)),
                )
                .await?;
                let mut users = vec![requester.clone()];
                users.extend(children.into_iter().flatten());
                Ok(users)
            }
            Role::ConsultingDoctor | Role::FrontDeskCoordinator => Ok(vec![requester.clone()]),
        }
    }

    /// Create the first admin when the directory has none.
    ///
    /// Returns the created account, or `None` when an admin already exists.
    pub async fn ensure_admin(&self, email: &str, name: &str, password: &str) -> Result<Option<User>> {
        if !self.store.list_users(Some(Role::Admin)).await?.is_empty() {
            return Ok(None);
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::Configuration {
                message: format!("Bootstrap admin password must be at least {} characters", MIN_PASSWORD_LEN),
            });
        }

        let admin = User::new(&normalize_email(email), name, Role::Admin, hash_password(password)?);
        self.store.insert_user(&admin).await?;
        info!(user_id = %admin.id, "Bootstrap admin created");
        Ok(Some(admin))
    }

    /// Clear edges before a role change or deletion
    async fn detach_hierarchy(&self, user: &mut User) -> Result<()> {
        if let Some(senior_id) = user.assigned_senior_doctor.take() {
            self.detach_from_senior(senior_id, user.id).await?;
        }

        let children = std::mem::take(&mut user.assigned_consulting_doctors);
        for child_id in children {
            if let Some(mut child) = self.store.find_user(child_id).await? {
                if child.assigned_senior_doctor == Some(user.id) {
                    child.assigned_senior_doctor = None;
                    child.touch();
                    self.store.update_user(&child).await?;
                }
            }
        }
        Ok(())
    }

    async fn release_patients(&self, doctor_id: Uuid) -> Result<()> {
        for mut patient in self.store.list_patients(PatientFilter::AssignedTo(doctor_id)).await? {
            patient.assigned_doctor = None;
            patient.updated_at = Utc::now();
            self.store.update_patient(&patient).await?;
        }
        Ok(())
    }

    async fn detach_from_senior(&self, senior_id: Uuid, consulting_id: Uuid) -> Result<()> {
        if let Some(mut senior) = self.store.find_user(senior_id).await? {
            if senior.assigned_consulting_doctors.remove(&consulting_id) {
                senior.touch();
                self.store.update_user(&senior).await?;
            }
        }
        Ok(())
    }

    async fn load_user(&self, id: Uuid) -> Result<User> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AnalysisStore, MemoryStore, PatientStore, UploadStore, UserStore};
    use crate::domain::{AiAnalysis, Demographics, Patient, UploadRecord};
    use async_trait::async_trait;
    use chrono::DateTime;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: IdentityService,
        admin: User,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let jwt = Arc::new(JwtManager::new("test-secret", 3600));
        let service = IdentityService::new(store.clone(), jwt);
        let admin = User::new("admin@clinic.test", "Admin", Role::Admin, hash_password("adminpass").unwrap());
        store.insert_user(&admin).await.unwrap();
        Fixture { store, service, admin }
    }

    fn new_user(email: &str, role: Role, senior: Option<Uuid>) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "Someone".to_string(),
            password: "correct horse".to_string(),
            role,
            assigned_senior_doctor: senior,
        }
    }

    async fn reload(fx: &Fixture, id: Uuid) -> User {
        fx.store.find_user(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_is_field_validation() {
        let fx = fixture().await;
        fx.service
            .register_user(&fx.admin, new_user("a@clinic.test", Role::FrontDeskCoordinator, None))
            .await
            .unwrap();

        let err = fx
            .service
            .register_user(&fx.admin, new_user("A@Clinic.test", Role::SeniorDoctor, None))
            .await
            .unwrap_err();
        match err {
            AppError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("email")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_admin_cannot_register() {
        let fx = fixture().await;
        let doctor = fx
            .service
            .register_user(&fx.admin, new_user("s@clinic.test", Role::SeniorDoctor, None))
            .await
            .unwrap();
        let err = fx
            .service
            .register_user(&doctor, new_user("x@clinic.test", Role::Admin, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_register_with_senior_links_both_ends() {
        let fx = fixture().await;
        let senior = fx
            .service
            .register_user(&fx.admin, new_user("s@clinic.test", Role::SeniorDoctor, None))
            .await
            .unwrap();
        let consulting = fx
            .service
            .register_user(&fx.admin, new_user("c@clinic.test", Role::ConsultingDoctor, Some(senior.id)))
            .await
            .unwrap();

        assert_eq!(consulting.assigned_senior_doctor, Some(senior.id));
        assert!(reload(&fx, senior.id).await.assigned_consulting_doctors.contains(&consulting.id));
    }

    #[tokio::test]
    async fn test_bad_senior_reference() {
        let fx = fixture().await;
        let desk = fx
            .service
            .register_user(&fx.admin, new_user("d@clinic.test", Role::FrontDeskCoordinator, None))
            .await
            .unwrap();
        let err = fx
            .service
            .register_user(&fx.admin, new_user("c@clinic.test", Role::ConsultingDoctor, Some(desk.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidReference { .. }));
        assert!(fx.store.find_user_by_email("c@clinic.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reassignment_removes_stale_edge() {
        let fx = fixture().await;
        let s1 = fx.service.register_user(&fx.admin, new_user("s1@clinic.test", Role::SeniorDoctor, None)).await.unwrap();
        let s2 = fx.service.register_user(&fx.admin, new_user("s2@clinic.test", Role::SeniorDoctor, None)).await.unwrap();
        let c = fx
            .service
            .register_user(&fx.admin, new_user("c@clinic.test", Role::ConsultingDoctor, Some(s1.id)))
            .await
            .unwrap();

        fx.service.assign_senior(&fx.admin, c.id, s2.id).await.unwrap();
        fx.service.assign_senior(&fx.admin, c.id, s2.id).await.unwrap();

        assert!(reload(&fx, s1.id).await.assigned_consulting_doctors.is_empty());
        let s2 = reload(&fx, s2.id).await;
        assert_eq!(s2.assigned_consulting_doctors.len(), 1);
        assert_eq!(reload(&fx, c.id).await.assigned_senior_doctor, Some(s2.id));
    }

    #[tokio::test]
    async fn test_role_change_clears_children() {
        let fx = fixture().await;
        let s = fx.service.register_user(&fx.admin, new_user("s@clinic.test", Role::SeniorDoctor, None)).await.unwrap();
        let c = fx
            .service
            .register_user(&fx.admin, new_user("c@clinic.test", Role::ConsultingDoctor, Some(s.id)))
            .await
            .unwrap();

        let demoted = fx.service.change_role(&fx.admin, s.id, Role::ConsultingDoctor).await.unwrap();
        assert!(demoted.assigned_consulting_doctors.is_empty());
        assert_eq!(reload(&fx, c.id).await.assigned_senior_doctor, None);
    }

    #[tokio::test]
    async fn test_authenticate() {
        let fx = fixture().await;
        let user = fx
            .service
            .register_user(&fx.admin, new_user("doc@clinic.test", Role::ConsultingDoctor, None))
            .await
            .unwrap();

        let (token, logged_in) = fx.service.authenticate("DOC@clinic.test", "correct horse").await.unwrap();
        assert!(logged_in.last_login_at.is_some());
        assert_eq!(fx.service.user_for_token(&token).await.unwrap().id, user.id);

        let wrong = fx.service.authenticate("doc@clinic.test", "nope").await.unwrap_err();
        let unknown = fx.service.authenticate("ghost@clinic.test", "nope").await.unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());

        fx.service.set_active(&fx.admin, user.id, false).await.unwrap();
        assert!(matches!(
            fx.service.authenticate("doc@clinic.test", "correct horse").await,
            Err(AppError::AccountInactive)
        ));
        assert!(matches!(
            fx.service.user_for_token(&token).await,
            Err(AppError::AccountInactive)
        ));
    }

    #[tokio::test]
    async fn test_list_users_scoping() {
        let fx = fixture().await;
        let s = fx.service.register_user(&fx.admin, new_user("s@clinic.test", Role::SeniorDoctor, None)).await.unwrap();
        let c = fx
            .service
            .register_user(&fx.admin, new_user("c@clinic.test", Role::ConsultingDoctor, Some(s.id)))
            .await
            .unwrap();
        let s = reload(&fx, s.id).await;

        assert_eq!(fx.service.list_users(&fx.admin).await.unwrap().len(), 3);
        assert_eq!(fx.service.list_users(&s).await.unwrap().len(), 2);
        assert_eq!(fx.service.list_users(&c).await.unwrap().len(), 1);

        assert!(fx.service.get_user(&s, c.id).await.is_ok());
        assert!(matches!(fx.service.get_user(&c, s.id).await, Err(AppError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_delete_self_forbidden() {
        let fx = fixture().await;
        let err = fx.service.delete_user(&fx.admin, fx.admin.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_ensure_admin_only_when_missing() {
        let store = Arc::new(MemoryStore::new());
        let service = IdentityService::new(store.clone(), Arc::new(JwtManager::new("test-secret", 3600)));

        let created = service.ensure_admin("Root@Clinic.test", "Root", "bootstrap-pass").await.unwrap();
        assert_eq!(created.map(|u| u.email), Some("root@clinic.test".to_string()));
        assert!(service.ensure_admin("other@clinic.test", "Other", "bootstrap-pass").await.unwrap().is_none());

        let (token, _) = service.authenticate("root@clinic.test", "bootstrap-pass").await.unwrap();
        assert_eq!(service.user_for_token(&token).await.unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn test_leaving_doctor_role_releases_patients() {
        let fx = fixture().await;
        let c = fx
            .service
            .register_user(&fx.admin, new_user("c@clinic.test", Role::ConsultingDoctor, None))
            .await
            .unwrap();

        let mut patient = Patient::new(Demographics::default(), fx.admin.id);
        patient.assigned_doctor = Some(c.id);
        fx.store.insert_patient(&patient).await.unwrap();
        let mut doctor = reload(&fx, c.id).await;
        doctor.assigned_patients.insert(patient.id);
        fx.store.update_user(&doctor).await.unwrap();

        let desk = fx
            .service
            .change_role(&fx.admin, c.id, Role::FrontDeskCoordinator)
            .await
            .unwrap();
        assert!(desk.assigned_patients.is_empty());
        assert!(reload(&fx, c.id).await.assigned_patients.is_empty());
        assert_eq!(fx.store.find_patient(patient.id).await.unwrap().unwrap().assigned_doctor, None);
    }

    #[tokio::test]
    async fn test_doctor_to_doctor_keeps_patients() {
        let fx = fixture().await;
        let c = fx
            .service
            .register_user(&fx.admin, new_user("c@clinic.test", Role::ConsultingDoctor, None))
            .await
            .unwrap();
        let mut patient = Patient::new(Demographics::default(), fx.admin.id);
        patient.assigned_doctor = Some(c.id);
        fx.store.insert_patient(&patient).await.unwrap();

        fx.service.change_role(&fx.admin, c.id, Role::SeniorDoctor).await.unwrap();
        assert_eq!(
            fx.store.find_patient(patient.id).await.unwrap().unwrap().assigned_doctor,
            Some(c.id)
        );
    }

    /// Deletes `senior` as soon as a consulting doctor is inserted
    struct VanishingSenior {
        inner: MemoryStore,
        senior: Uuid,
    }

    #[async_trait]
    impl UserStore for VanishingSenior {
        async fn insert_user(&self, user: &User) -> Result<()> {
            if user.role == Role::ConsultingDoctor {
                self.inner.delete_user(self.senior).await?;
            }
            self.inner.insert_user(user).await
        }
        async fn update_user(&self, user: &User) -> Result<()> {
            self.inner.update_user(user).await
        }
        async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
            self.inner.find_user(id).await
        }
        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
            self.inner.find_user_by_email(email).await
        }
        async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
            self.inner.list_users(role).await
        }
        async fn delete_user(&self, id: Uuid) -> Result<bool> {
            self.inner.delete_user(id).await
        }
    }

    #[async_trait]
    impl PatientStore for VanishingSenior {
        async fn insert_patient(&self, patient: &Patient) -> Result<()> {
            self.inner.insert_patient(patient).await
        }
        async fn update_patient(&self, patient: &Patient) -> Result<()> {
            self.inner.update_patient(patient).await
        }
        async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>> {
            self.inner.find_patient(id).await
        }
        async fn list_patients(&self, filter: PatientFilter) -> Result<Vec<Patient>> {
            self.inner.list_patients(filter).await
        }
    }

    #[async_trait]
    impl UploadStore for VanishingSenior {
        async fn insert_upload(&self, upload: &UploadRecord) -> Result<()> {
            self.inner.insert_upload(upload).await
        }
        async fn update_upload(&self, upload: &UploadRecord) -> Result<()> {
            self.inner.update_upload(upload).await
        }
        async fn find_upload(&self, id: Uuid) -> Result<Option<UploadRecord>> {
            self.inner.find_upload(id).await
        }
        async fn list_uploads_for_patient(&self, patient_id: Uuid) -> Result<Vec<UploadRecord>> {
            self.inner.list_uploads_for_patient(patient_id).await
        }
        async fn delete_upload(&self, id: Uuid) -> Result<bool> {
            self.inner.delete_upload(id).await
        }
    }

    #[async_trait]
    impl AnalysisStore for VanishingSenior {
        async fn insert_analysis(&self, analysis: &AiAnalysis) -> Result<()> {
            self.inner.insert_analysis(analysis).await
        }
        async fn update_analysis_from(&self, analysis: &AiAnalysis, expected: crate::domain::AnalysisStatus) -> Result<bool> {
            self.inner.update_analysis_from(analysis, expected).await
        }
        async fn find_analysis(&self, analysis_id: &str) -> Result<Option<AiAnalysis>> {
            self.inner.find_analysis(analysis_id).await
        }
        async fn list_analyses_for_patient(&self, patient_id: Uuid) -> Result<Vec<AiAnalysis>> {
            self.inner.list_analyses_for_patient(patient_id).await
        }
        async fn list_processing_started_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<AiAnalysis>> {
            self.inner.list_processing_started_before(cutoff).await
        }
    }

    #[tokio::test]
    async fn test_registration_rolls_back_when_senior_vanishes() {
        let inner = MemoryStore::new();
        let admin = User::new("admin@clinic.test", "Admin", Role::Admin, String::new());
        let senior = User::new("s@clinic.test", "Senior", Role::SeniorDoctor, String::new());
        inner.insert_user(&admin).await.unwrap();
        inner.insert_user(&senior).await.unwrap();

        let store = Arc::new(VanishingSenior { inner, senior: senior.id });
        let service = IdentityService::new(store.clone(), Arc::new(JwtManager::new("test-secret", 3600)));

        let err = service
            .register_user(&admin, new_user("c@clinic.test", Role::ConsultingDoctor, Some(senior.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserNotFound { .. }));
        assert!(store.find_user_by_email("c@clinic.test").await.unwrap().is_none());
    }
}
