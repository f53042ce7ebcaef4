//! MedVault Common Library
//!
//! Everything behind the HTTP surface:
//! - Domain entities and their state machines
//! - Role-based access policy
//! - Identity, patient, upload and analysis lifecycles
//! - Persistence (SeaORM repository and in-process store)
//! - Object storage and inference collaborators
//! - Error types, configuration, authentication, metrics

pub mod access;
pub mod analysis;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod inference;
pub mod metrics;
pub mod patients;
pub mod services;
pub mod storage;
pub mod uploads;

#[cfg(test)]
mod scenarios;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use services::Services;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
