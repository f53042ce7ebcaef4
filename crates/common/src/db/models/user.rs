//! User entity

use super::{from_json, to_json};
use crate::domain::{Role, User};
use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub email: String,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub role: String,

    #[sea_orm(column_type = "Text")]
    pub password_hash: String,

    pub is_active: bool,

    pub assigned_senior_doctor: Option<Uuid>,

    /// Array of consulting doctor ids (senior doctors only)
    #[sea_orm(column_type = "JsonBinary")]
    pub assigned_consulting_doctors: Json,

    /// Array of patient ids
    #[sea_orm(column_type = "JsonBinary")]
    pub assigned_patients: Json,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,

    pub last_login_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::AssignedSeniorDoctor",
        to = "Column::Id"
    )]
    SeniorDoctor,
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for User {
    type Error = AppError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(User {
            id: model.id,
            email: model.email,
            name: model.name,
            role: model.role.parse::<Role>()?,
            password_hash: model.password_hash,
            is_active: model.is_active,
            assigned_senior_doctor: model.assigned_senior_doctor,
            assigned_consulting_doctors: from_json(model.assigned_consulting_doctors)?,
            assigned_patients: from_json(model.assigned_patients)?,
            created_at: model.created_at.to_utc(),
            updated_at: model.updated_at.to_utc(),
            last_login_at: model.last_login_at.map(|t| t.to_utc()),
        })
    }
}

impl TryFrom<&User> for ActiveModel {
    type Error = AppError;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        Ok(ActiveModel {
            id: Set(user.id),
            email: Set(user.email.clone()),
            name: Set(user.name.clone()),
            role: Set(user.role.as_str().to_string()),
            password_hash: Set(user.password_hash.clone()),
            is_active: Set(user.is_active),
            assigned_senior_doctor: Set(user.assigned_senior_doctor),
            assigned_consulting_doctors: Set(to_json(&user.assigned_consulting_doctors)?),
            assigned_patients: Set(to_json(&user.assigned_patients)?),
            created_at: Set(user.created_at.into()),
            updated_at: Set(user.updated_at.into()),
            last_login_at: Set(user.last_login_at.map(Into::into)),
        })
    }
}
