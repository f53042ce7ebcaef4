//! AI analysis entity

use super::{from_json, to_json};
use crate::domain::{AiAnalysis, AnalysisResult};
use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ai_analyses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Public `ANL-...` identifier
    #[sea_orm(column_type = "Text", unique)]
    pub analysis_id: String,

    pub patient_id: Uuid,

    pub document_id: Uuid,

    pub requested_by: Uuid,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub summary: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub key_findings: Option<Json>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub recommendations: Option<Json>,

    pub confidence: Option<f64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub model: String,

    pub pdf_report_id: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,

    pub started_at: Option<DateTimeWithTimeZone>,

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

    #[sea_orm(
        belongs_to = "super::upload_record::Entity",
        from = "Column::DocumentId",
        to = "super::upload_record::Column::Id"
    )]
    Document,
}

impl Related<super::patient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Patient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for AiAnalysis {
    type Error = AppError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let result = match model.summary {
            Some(summary) => Some(AnalysisResult {
                summary,
                key_findings: model.key_findings.map(from_json).transpose()?.unwrap_or_default(),
                recommendations: model
                    .recommendations
                    .map(from_json)
                    .transpose()?
                    .unwrap_or_default(),
                confidence: model.confidence.unwrap_or_default(),
            }),
            None => None,
        };

        Ok(AiAnalysis {
            id: model.id,
            analysis_id: model.analysis_id,
            patient_id: model.patient_id,
            document_id: model.document_id,
            requested_by: model.requested_by,
            status: model.status.parse()?,
            result,
            error_message: model.error_message,
            model: model.model,
            pdf_report_id: model.pdf_report_id,
            created_at: model.created_at.to_utc(),
            started_at: model.started_at.map(|t| t.to_utc()),
            completed_at: model.completed_at.map(|t| t.to_utc()),
        })
    }
}

impl TryFrom<&AiAnalysis> for ActiveModel {
    type Error = AppError;

    fn try_from(analysis: &AiAnalysis) -> Result<Self, Self::Error> {
        let result = analysis.result.as_ref();
        Ok(ActiveModel {
            id: Set(analysis.id),
            analysis_id: Set(analysis.analysis_id.clone()),
            patient_id: Set(analysis.patient_id),
            document_id: Set(analysis.document_id),
            requested_by: Set(analysis.requested_by),
            status: Set(analysis.status.as_str().to_string()),
            summary: Set(result.map(|r| r.summary.clone())),
            key_findings: Set(result.map(|r| to_json(&r.key_findings)).transpose()?),
            recommendations: Set(result.map(|r| to_json(&r.recommendations)).transpose()?),
            confidence: Set(result.map(|r| r.confidence)),
            error_message: Set(analysis.error_message.clone()),
            model: Set(analysis.model.clone()),
            pdf_report_id: Set(analysis.pdf_report_id),
            created_at: Set(analysis.created_at.into()),
            started_at: Set(analysis.started_at.map(Into::into)),
            completed_at: Set(analysis.completed_at.map(Into::into)),
        })
    }
}
