//! AI analysis records
//!
//! `pending -> processing -> completed | failed`. Terminal records keep their
//! status and result; a retry is a new record.

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }

    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        matches!(
            (self, next),
            (AnalysisStatus::Pending, AnalysisStatus::Processing)
                | (AnalysisStatus::Processing, AnalysisStatus::Completed)
                | (AnalysisStatus::Processing, AnalysisStatus::Failed)
        )
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnalysisStatus::Pending),
            "processing" => Ok(AnalysisStatus::Processing),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            other => Err(AppError::Internal {
                message: format!("Unknown analysis status: {}", other),
            }),
        }
    }
}

/// Structured output of a completed analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    /// 0.0 ..= 1.0
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub id: Uuid,
    /// Public identifier, `ANL-<unix ms>-<6 hex>`
    pub analysis_id: String,
    pub patient_id: Uuid,
    /// Source upload record
    pub document_id: Uuid,
    pub requested_by: Uuid,
    pub status: AnalysisStatus,
    pub result: Option<AnalysisResult>,
    pub error_message: Option<String>,
    pub model: String,
    /// Generated PDF report upload, when rendering succeeded
    pub pdf_report_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AiAnalysis {
    pub fn new(patient_id: Uuid, document_id: Uuid, requested_by: Uuid, model: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            analysis_id: generate_analysis_id(now),
            patient_id,
            document_id,
            requested_by,
            status: AnalysisStatus::Pending,
            result: None,
            error_message: None,
            model: model.to_string(),
            pdf_report_id: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(AnalysisStatus::Processing)?;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, result: AnalysisResult, now: DateTime<Utc>) -> Result<()> {
        self.transition(AnalysisStatus::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, message: &str, now: DateTime<Utc>) -> Result<()> {
        self.transition(AnalysisStatus::Failed)?;
        self.error_message = Some(message.to_string());
        self.completed_at = Some(now);
        Ok(())
    }

    /// Link the generated report; only a completed analysis without one qualifies
    pub fn attach_report(&mut self, report_id: Uuid) -> Result<()> {
        if self.status != AnalysisStatus::Completed {
            return Err(AppError::Conflict {
                message: format!("analysis {} is {}, not completed", self.analysis_id, self.status),
            });
        }
        if self.pdf_report_id.is_some() {
            return Err(AppError::Conflict {
                message: format!("analysis {} already has a report", self.analysis_id),
            });
        }
        self.pdf_report_id = Some(report_id);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Processing since before `cutoff`
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == AnalysisStatus::Processing
            && self.started_at.unwrap_or(self.created_at) < cutoff
    }

    fn transition(&mut self, next: AnalysisStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                entity: "analysis",
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

fn generate_analysis_id(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("ANL-{}-{:06x}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis() -> AiAnalysis {
        AiAnalysis::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "test-model")
    }

    fn result() -> AnalysisResult {
        AnalysisResult {
            summary: "ok".into(),
            key_findings: vec!["a".into()],
            recommendations: vec!["b".into()],
            confidence: 0.9,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut a = analysis();
        let now = Utc::now();
        a.begin_processing(now).unwrap();
        assert_eq!(a.status, AnalysisStatus::Processing);
        a.complete(result(), now).unwrap();
        assert!(a.is_terminal());
        assert_eq!(a.result.as_ref().unwrap().confidence, 0.9);
    }

    #[test]
    fn test_terminal_is_final() {
        let mut a = analysis();
        let now = Utc::now();
        a.begin_processing(now).unwrap();
        a.fail("provider down", now).unwrap();

        assert!(a.complete(result(), now).is_err());
        assert!(a.begin_processing(now).is_err());
        assert_eq!(a.status, AnalysisStatus::Failed);
        assert!(a.result.is_none());
    }

    #[test]
    fn test_cannot_skip_processing() {
        let mut a = analysis();
        assert!(a.complete(result(), Utc::now()).is_err());
        assert_eq!(a.status, AnalysisStatus::Pending);
    }

    #[test]
    fn test_attach_report_requires_completed() {
        let mut a = analysis();
        assert!(a.attach_report(Uuid::new_v4()).is_err());
        a.begin_processing(Utc::now()).unwrap();
        a.complete(result(), Utc::now()).unwrap();
        let report = Uuid::new_v4();
        a.attach_report(report).unwrap();
        assert_eq!(a.pdf_report_id, Some(report));
        assert!(a.attach_report(Uuid::new_v4()).is_err());
        assert_eq!(a.status, AnalysisStatus::Completed);
    }

    #[test]
    fn test_staleness() {
        let mut a = analysis();
        let started = Utc::now() - chrono::Duration::minutes(30);
        a.begin_processing(started).unwrap();
        assert!(a.is_stale(Utc::now() - chrono::Duration::minutes(15)));
        assert!(!a.is_stale(started - chrono::Duration::minutes(1)));
    }

    #[test]
    fn test_analysis_ids_are_distinct() {
        let a = analysis();
        let b = analysis();
        assert!(a.analysis_id.starts_with("ANL-"));
        assert_ne!(a.id, b.id);
    }
}
