//! Repository pattern for database operations
//!
//! Postgres-backed implementation of the record store traits. Reads go to
//! the replica when one is configured.

use super::store::{AnalysisStore, PatientFilter, PatientStore, UploadStore, UserStore};
use crate::db::models::*;
use crate::db::DbPool;
use crate::domain::{AiAnalysis, AnalysisStatus, Patient, Role, UploadRecord, User};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, SqlErr,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

/// Unique violations surface as `Duplicate`, everything else as a database error
fn insert_error(err: DbErr, what: impl FnOnce() -> String) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Duplicate { message: what() },
        _ => AppError::Database(err),
    }
}

fn update_error(err: DbErr, resource_type: &str, id: impl ToString) -> AppError {
    match err {
        DbErr::RecordNotUpdated | DbErr::RecordNotFound(_) => AppError::NotFound {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        },
        other => AppError::Database(other),
    }
}

fn convert_all<M, T>(rows: Vec<M>) -> Result<Vec<T>>
where
    T: TryFrom<M, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ============================================================================
// Users
// ============================================================================

#[async_trait]
impl UserStore for Repository {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let model = UserActiveModel::try_from(user)?;
        UserEntity::insert(model)
            .exec(self.write_conn())
            .await
            .map_err(|e| insert_error(e, || format!("email {} already registered", user.email)))?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        UserActiveModel::try_from(user)?
            .update(self.write_conn())
            .await
            .map_err(|e| update_error(e, "user", user.id))?;
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.read_conn())
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.read_conn())
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let mut query = UserEntity::find();
        if let Some(role) = role {
            query = query.filter(UserColumn::Role.eq(role.as_str()));
        }
        let rows = query
            .order_by_asc(UserColumn::CreatedAt)
            .all(self.read_conn())
            .await?;
        convert_all(rows)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let result = UserEntity::delete_by_id(id).exec(self.write_conn()).await?;
        Ok(result.rows_affected > 0)
    }
}

// ============================================================================
// Patients
// ============================================================================

#[async_trait]
impl PatientStore for Repository {
    async fn insert_patient(&self, patient: &Patient) -> Result<()> {
        let model = PatientActiveModel::try_from(patient)?;
        PatientEntity::insert(model)
            .exec(self.write_conn())
            .await
            .map_err(|e| {
                insert_error(e, || {
                    format!("patient number {} already exists", patient.patient_number)
                })
            })?;
        Ok(())
    }

    async fn update_patient(&self, patient: &Patient) -> Result<()> {
        PatientActiveModel::try_from(patient)?
            .update(self.write_conn())
            .await
            .map_err(|e| update_error(e, "patient", patient.id))?;
        Ok(())
    }

    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>> {
        PatientEntity::find_by_id(id)
            .one(self.read_conn())
            .await?
            .map(Patient::try_from)
            .transpose()
    }

    async fn list_patients(&self, filter: PatientFilter) -> Result<Vec<Patient>> {
        let query = match filter {
            PatientFilter::All => PatientEntity::find(),
            PatientFilter::AssignedTo(doctor) => {
                PatientEntity::find().filter(PatientColumn::AssignedDoctor.eq(doctor))
            }
            PatientFilter::CreatedBy(creator) => {
                PatientEntity::find().filter(PatientColumn::CreatedBy.eq(creator))
            }
        };
        let rows = query
            .order_by_desc(PatientColumn::CreatedAt)
            .all(self.read_conn())
            .await?;
        convert_all(rows)
    }
}

// ============================================================================
// Uploads
// ============================================================================

#[async_trait]
impl UploadStore for Repository {
    async fn insert_upload(&self, upload: &UploadRecord) -> Result<()> {
        UploadEntity::insert(UploadActiveModel::from(upload))
            .exec(self.write_conn())
            .await
            .map_err(|e| {
                insert_error(e, || format!("storage key {} already recorded", upload.storage_key))
            })?;
        Ok(())
    }

    async fn update_upload(&self, upload: &UploadRecord) -> Result<()> {
        UploadActiveModel::from(upload)
            .update(self.write_conn())
            .await
            .map_err(|e| update_error(e, "upload", upload.id))?;
        Ok(())
    }

    async fn find_upload(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        UploadEntity::find_by_id(id)
            .one(self.read_conn())
            .await?
            .map(UploadRecord::try_from)
            .transpose()
    }

    async fn list_uploads_for_patient(&self, patient_id: Uuid) -> Result<Vec<UploadRecord>> {
        let rows = UploadEntity::find()
            .filter(UploadColumn::PatientId.eq(patient_id))
            .order_by_desc(UploadColumn::CreatedAt)
            .all(self.read_conn())
            .await?;
        convert_all(rows)
    }

    async fn delete_upload(&self, id: Uuid) -> Result<bool> {
        let result = UploadEntity::delete_by_id(id).exec(self.write_conn()).await?;
        Ok(result.rows_affected > 0)
    }
}

// ============================================================================
// Analyses
// ============================================================================

#[async_trait]
impl AnalysisStore for Repository {
    async fn insert_analysis(&self, analysis: &AiAnalysis) -> Result<()> {
        let model = AnalysisActiveModel::try_from(analysis)?;
        AnalysisEntity::insert(model)
            .exec(self.write_conn())
            .await
            .map_err(|e| {
                insert_error(e, || format!("analysis {} already exists", analysis.analysis_id))
            })?;
        Ok(())
    }

    async fn update_analysis_from(&self, analysis: &AiAnalysis, expected: AnalysisStatus) -> Result<bool> {
        let updated = AnalysisEntity::update_many()
            .set(AnalysisActiveModel::try_from(analysis)?)
            .filter(AnalysisColumn::AnalysisId.eq(analysis.analysis_id.as_str()))
            .filter(AnalysisColumn::Status.eq(expected.as_str()))
            .exec(self.write_conn())
            .await?;
        if updated.rows_affected > 0 {
            return Ok(true);
        }

        // Zero rows: either the record moved on or it never existed
        match self.find_analysis(&analysis.analysis_id).await? {
            Some(_) => Ok(false),
            None => Err(AppError::NotFound {
                resource_type: "analysis".to_string(),
                id: analysis.analysis_id.clone(),
            }),
        }
    }

    async fn find_analysis(&self, analysis_id: &str) -> Result<Option<AiAnalysis>> {
        AnalysisEntity::find()
            .filter(AnalysisColumn::AnalysisId.eq(analysis_id))
            .one(self.read_conn())
            .await?
            .map(AiAnalysis::try_from)
            .transpose()
    }

    async fn list_analyses_for_patient(&self, patient_id: Uuid) -> Result<Vec<AiAnalysis>> {
        let rows = AnalysisEntity::find()
            .filter(AnalysisColumn::PatientId.eq(patient_id))
            .order_by_desc(AnalysisColumn::CreatedAt)
            .all(self.read_conn())
            .await?;
        convert_all(rows)
    }

    async fn list_processing_started_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<AiAnalysis>> {
        let rows = AnalysisEntity::find()
            .filter(AnalysisColumn::Status.eq(AnalysisStatus::Processing.as_str()))
            .filter(
                Condition::any()
                    .add(AnalysisColumn::StartedAt.lt(cutoff))
                    .add(
                        Condition::all()
                            .add(AnalysisColumn::StartedAt.is_null())
                            .add(AnalysisColumn::CreatedAt.lt(cutoff)),
                    ),
            )
            .all(self.read_conn())
            .await?;
        convert_all(rows)
    }
}
