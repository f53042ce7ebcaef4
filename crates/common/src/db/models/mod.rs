//! SeaORM entity models
//!
//! Database entities for MedVault. Set-valued and list-valued columns are
//! JSONB; conversions to the domain types live next to each entity.

mod ai_analysis;
mod patient;
mod upload_record;
mod user;

use crate::errors::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use user::{
    ActiveModel as UserActiveModel,
    Column as UserColumn,
    Entity as UserEntity,
    Model as UserRow,
};

pub use patient::{
    ActiveModel as PatientActiveModel,
    Column as PatientColumn,
    Entity as PatientEntity,
    Model as PatientRow,
};

pub use upload_record::{
    ActiveModel as UploadActiveModel,
    Column as UploadColumn,
    Entity as UploadEntity,
    Model as UploadRow,
};

pub use ai_analysis::{
    ActiveModel as AnalysisActiveModel,
    Column as AnalysisColumn,
    Entity as AnalysisEntity,
    Model as AnalysisRow,
};

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn from_json<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}
