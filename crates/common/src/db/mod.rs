//! Database layer for MedVault
//!
//! Provides:
//! - Record store traits the lifecycles depend on
//! - SeaORM entity models and the Postgres repository
//! - An in-process store for tests and `memory://` runs
//! - Connection pool management and migrations

mod memory;
pub mod models;
mod repository;
mod store;

pub use memory::MemoryStore;
pub use repository::Repository;
pub use store::{AnalysisStore, PatientFilter, PatientStore, RecordStore, UploadStore, UserStore};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

async fn connect(url: &str, config: &DatabaseConfig, label: &str) -> Result<DatabaseConnection> {
    info!(connection = label, "Connecting to database...");

    let mut opts = ConnectOptions::new(url);
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(false);

    Database::connect(opts)
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to connect to {}: {}", label, e),
        })
}

impl DbPool {
    /// Connect the primary and, when configured, the read replica
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let primary = connect(&config.url, config, "primary").await?;
        let replica = match config.read_url.as_deref() {
            Some(read_url) => Some(connect(read_url, config, "replica").await?),
            None => None,
        };

        info!(replica = replica.is_some(), "Database connections established");
        Ok(Self { primary, replica })
    }

    /// Connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Apply pending SQL migrations from `migrations/`
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Applying database migrations...");

        sqlx::migrate!("./migrations")
            .run(self.primary.get_postgres_connection_pool())
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Migration failed: {}", e),
            })
    }

    /// `SELECT 1` against every connection
    pub async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;

        for (label, conn) in std::iter::once(("primary", &self.primary))
            .chain(self.replica.as_ref().map(|r| ("replica", r)))
        {
            conn.execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("{} ping failed: {}", label, e),
                })?;
        }
        Ok(())
    }
}
