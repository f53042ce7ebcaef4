//! Domain entities
//!
//! Plain types with their own transition rules. Persistence lives in
//! [`crate::db`]; nothing here knows about storage.

pub mod analysis;
pub mod patient;
pub mod upload;
pub mod user;

pub use analysis::{AiAnalysis, AnalysisResult, AnalysisStatus};
pub use patient::{Demographics, Patient, PatientNote, PatientStatus};
pub use upload::{file_extension, DocumentType, Transition, UploadRecord, UploadStatus};
pub use user::{normalize_email, Role, User};
