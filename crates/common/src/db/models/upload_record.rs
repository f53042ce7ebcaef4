//! Upload record entity

use crate::domain::UploadRecord;
use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "upload_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub patient_id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub storage_key: String,

    #[sea_orm(column_type = "Text")]
    pub file_name: String,

    #[sea_orm(column_type = "Text")]
    pub content_type: String,

    pub size_bytes: i64,

    #[sea_orm(column_type = "Text", nullable)]
    pub checksum: Option<String>,

    pub uploaded_by: Uuid,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text")]
    pub document_type: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::patient::Entity",
        from = "Column::PatientId",
        to = "super::patient::Column::Id"
    )]
    Patient,
}

impl Related<super::patient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Patient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for UploadRecord {
    type Error = AppError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(UploadRecord {
            id: model.id,
            patient_id: model.patient_id,
            storage_key: model.storage_key,
            file_name: model.file_name,
            content_type: model.content_type,
            size_bytes: u64::try_from(model.size_bytes).unwrap_or_default(),
            checksum: model.checksum,
            uploaded_by: model.uploaded_by,
            status: model.status.parse()?,
            document_type: model.document_type.parse()?,
            error_message: model.error_message,
            created_at: model.created_at.to_utc(),
            completed_at: model.completed_at.map(|t| t.to_utc()),
        })
    }
}

impl From<&UploadRecord> for ActiveModel {
    fn from(upload: &UploadRecord) -> Self {
        ActiveModel {
            id: Set(upload.id),
            patient_id: Set(upload.patient_id),
            storage_key: Set(upload.storage_key.clone()),
            file_name: Set(upload.file_name.clone()),
            content_type: Set(upload.content_type.clone()),
            size_bytes: Set(i64::try_from(upload.size_bytes).unwrap_or(i64::MAX)),
            checksum: Set(upload.checksum.clone()),
            uploaded_by: Set(upload.uploaded_by),
            status: Set(upload.status.as_str().to_string()),
            document_type: Set(upload.document_type.as_str().to_string()),
            error_message: Set(upload.error_message.clone()),
            created_at: Set(upload.created_at.into()),
            completed_at: Set(upload.completed_at.map(Into::into)),
        }
    }
}
