//! Patient entity

use super::{from_json, to_json};
use crate::domain::{Demographics, Patient};
use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "patients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub patient_number: String,

    #[sea_orm(column_type = "Text")]
    pub first_name: String,

    #[sea_orm(column_type = "Text")]
    pub last_name: String,

    pub date_of_birth: Option<Date>,

    #[sea_orm(column_type = "Text", nullable)]
    pub gender: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub phone: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub email: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub address: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub medical_history: Json,

    #[sea_orm(column_type = "JsonBinary")]
    pub allergies: Json,

    pub assigned_doctor: Option<Uuid>,

    pub created_by: Uuid,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// Timeline notes as JSONB
    #[sea_orm(column_type = "JsonBinary")]
    pub notes: Json,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AssignedDoctor",
        to = "super::user::Column::Id"
    )]
    AssignedDoctor,

    #[sea_orm(has_many = "super::upload_record::Entity")]
    Uploads,

    #[sea_orm(has_many = "super::ai_analysis::Entity")]
    Analyses,
}

impl Related<super::upload_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Uploads.def()
    }
}

impl Related<super::ai_analysis::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Analyses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Patient {
    type Error = AppError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Patient {
            id: model.id,
            patient_number: model.patient_number,
            demographics: Demographics {
                first_name: model.first_name,
                last_name: model.last_name,
                date_of_birth: model.date_of_birth,
                gender: model.gender,
                phone: model.phone,
                email: model.email,
                address: model.address,
            },
            medical_history: from_json(model.medical_history)?,
            allergies: from_json(model.allergies)?,
            assigned_doctor: model.assigned_doctor,
            created_by: model.created_by,
            status: model.status.parse()?,
            notes: from_json(model.notes)?,
            created_at: model.created_at.to_utc(),
            updated_at: model.updated_at.to_utc(),
        })
    }
}

impl TryFrom<&Patient> for ActiveModel {
    type Error = AppError;

    fn try_from(patient: &Patient) -> Result<Self, Self::Error> {
        let d = &patient.demographics;
        Ok(ActiveModel {
            id: Set(patient.id),
            patient_number: Set(patient.patient_number.clone()),
            first_name: Set(d.first_name.clone()),
            last_name: Set(d.last_name.clone()),
            date_of_birth: Set(d.date_of_birth),
            gender: Set(d.gender.clone()),
            phone: Set(d.phone.clone()),
            email: Set(d.email.clone()),
            address: Set(d.address.clone()),
            medical_history: Set(to_json(&patient.medical_history)?),
            allergies: Set(to_json(&patient.allergies)?),
            assigned_doctor: Set(patient.assigned_doctor),
            created_by: Set(patient.created_by),
            status: Set(patient.status.as_str().to_string()),
            notes: Set(to_json(&patient.notes)?),
            created_at: Set(patient.created_at.into()),
            updated_at: Set(patient.updated_at.into()),
        })
    }
}
