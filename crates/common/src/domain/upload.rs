//! Upload records and their status transitions
//!
//! Status only moves forward: `pending -> completed` or `pending -> failed`.
//! Report records produced by analyses are born completed.

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadStatus::Pending)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "completed" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(AppError::Internal {
                message: format!("Unknown upload status: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    UserUploaded,
    AiAnalysisReport,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::UserUploaded => "user_uploaded",
            DocumentType::AiAnalysisReport => "ai_analysis_report",
        }
    }

    /// Storage key segment
    pub fn category(&self) -> &'static str {
        match self {
            DocumentType::UserUploaded => "documents",
            DocumentType::AiAnalysisReport => "reports",
        }
    }
}

impl FromStr for DocumentType {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user_uploaded" => Ok(DocumentType::UserUploaded),
            "ai_analysis_report" => Ok(DocumentType::AiAnalysisReport),
            other => Err(AppError::Internal {
                message: format!("Unknown document type: {}", other),
            }),
        }
    }
}

/// Outcome of applying a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Already in the requested state; nothing written
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub storage_key: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    /// SHA-256 of the stored bytes when the server saw them
    pub checksum: Option<String>,
    pub uploaded_by: Uuid,
    pub status: UploadStatus,
    pub document_type: DocumentType,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadRecord {
    /// A user upload awaiting confirmation
    pub fn pending(
        patient_id: Uuid,
        storage_key: String,
        file_name: &str,
        content_type: &str,
        size_bytes: u64,
        uploaded_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            storage_key,
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            checksum: None,
            uploaded_by,
            status: UploadStatus::Pending,
            document_type: DocumentType::UserUploaded,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// A derived report artifact; always completed at creation
    pub fn analysis_report(
        patient_id: Uuid,
        storage_key: String,
        file_name: &str,
        size_bytes: u64,
        checksum: String,
        generated_for: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            storage_key,
            file_name: file_name.to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes,
            checksum: Some(checksum),
            uploaded_by: generated_for,
            status: UploadStatus::Completed,
            document_type: DocumentType::AiAnalysisReport,
            error_message: None,
            created_at: now,
            completed_at: Some(now),
        }
    }

    /// pending -> completed; repeat confirmation is a no-op
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<Transition> {
        match self.status {
            UploadStatus::Pending => {
                self.status = UploadStatus::Completed;
                self.completed_at = Some(now);
                Ok(Transition::Applied)
            }
            UploadStatus::Completed => Ok(Transition::Unchanged),
            UploadStatus::Failed => Err(self.invalid(UploadStatus::Completed)),
        }
    }

    /// pending -> failed
    pub fn fail(&mut self, reason: &str) -> Result<Transition> {
        match self.status {
            UploadStatus::Pending => {
                self.status = UploadStatus::Failed;
                self.error_message = Some(reason.to_string());
                Ok(Transition::Applied)
            }
            UploadStatus::Failed => Ok(Transition::Unchanged),
            UploadStatus::Completed => Err(self.invalid(UploadStatus::Failed)),
        }
    }

    pub fn is_report(&self) -> bool {
        self.document_type == DocumentType::AiAnalysisReport
    }

    /// Lower-cased extension of the original file name
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.file_name)
    }

    fn invalid(&self, to: UploadStatus) -> AppError {
        AppError::InvalidTransition {
            entity: "upload",
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> UploadRecord {
        UploadRecord::pending(
            Uuid::new_v4(),
            "patients/p/documents/x.pdf".into(),
            "scan.PDF",
            "application/pdf",
            1024,
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_complete_then_repeat_is_noop() {
        let mut upload = record();
        let now = Utc::now();
        assert_eq!(upload.complete(now).unwrap(), Transition::Applied);
        assert_eq!(upload.completed_at, Some(now));

        let later = now + chrono::Duration::seconds(5);
        assert_eq!(upload.complete(later).unwrap(), Transition::Unchanged);
        assert_eq!(upload.completed_at, Some(now));
        assert_eq!(upload.status, UploadStatus::Completed);
    }

    #[test]
    fn test_terminal_states_never_cross() {
        let mut failed = record();
        failed.fail("PUT rejected").unwrap();
        assert!(failed.complete(Utc::now()).is_err());
        assert_eq!(failed.status, UploadStatus::Failed);

        let mut completed = record();
        completed.complete(Utc::now()).unwrap();
        assert!(completed.fail("late failure").is_err());
        assert_eq!(completed.status, UploadStatus::Completed);
        assert!(completed.error_message.is_none());
    }

    #[test]
    fn test_report_is_born_completed() {
        let report = UploadRecord::analysis_report(
            Uuid::new_v4(),
            "patients/p/reports/r.pdf".into(),
            "report.pdf",
            10,
            "abc".into(),
            Uuid::new_v4(),
        );
        assert_eq!(report.status, UploadStatus::Completed);
        assert!(report.completed_at.is_some());
        assert!(report.is_report());
    }

    #[test]
    fn test_extension() {
        assert_eq!(record().extension().as_deref(), Some("pdf"));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension(".bashrc"), None);
        assert_eq!(file_extension("a.tar.GZ").as_deref(), Some("gz"));
    }
}
