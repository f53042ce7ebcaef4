//! Service wiring
//!
//! Builds the record store and collaborators once from configuration and
//! hands the same instances to every lifecycle service.

use crate::analysis::AnalysisService;
use crate::auth::JwtManager;
use crate::config::AppConfig;
use crate::db::{DbPool, MemoryStore, RecordStore, Repository};
use crate::errors::{AppError, Result};
use crate::identity::IdentityService;
use crate::inference::{create_inference_client, InferenceClient};
use crate::patients::PatientService;
use crate::storage::{create_object_store, ObjectStore};
use crate::uploads::UploadService;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Services {
    pub identity: IdentityService,
    pub patients: PatientService,
    pub uploads: UploadService,
    pub analyses: AnalysisService,
    pool: Option<DbPool>,
}

impl Services {
    /// Wire services over already constructed collaborators
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        inference: Arc<dyn InferenceClient>,
        jwt: Arc<JwtManager>,
    ) -> Result<Self> {
        Ok(Self {
            identity: IdentityService::new(store.clone(), jwt),
            patients: PatientService::new(store.clone()),
            uploads: UploadService::new(store.clone(), objects.clone(), &config.uploads, &config.storage),
            analyses: AnalysisService::new(
                store,
                objects,
                inference,
                &config.analysis,
                config.inference_timeout(),
            )?,
            pool: None,
        })
    }

    /// Connect the configured backends and wire services over them.
    ///
    /// `memory://` selects the in-process store. Otherwise Postgres is
    /// connected and, when enabled, migrated before anything is served.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let (store, pool): (Arc<dyn RecordStore>, Option<DbPool>) = if config.uses_memory_store() {
            warn!("Using in-memory record store; data is lost on restart");
            (Arc::new(MemoryStore::new()), None)
        } else {
            let pool = DbPool::new(&config.database).await?;
            if config.database.run_migrations {
                pool.run_migrations().await?;
            }
            (Arc::new(Repository::new(pool.clone())), Some(pool))
        };

        let objects = create_object_store(&config.storage).await?;
        let inference = create_inference_client(&config.inference)?;
        let jwt = Arc::new(JwtManager::new(&jwt_secret(config)?, config.auth.jwt_expiration_secs));

        let mut services = Self::new(config, store, objects, inference, jwt)?;
        services.pool = pool;

        if let (Some(email), Some(password)) = (
            config.auth.bootstrap_admin_email.as_deref(),
            config.auth.bootstrap_admin_password.as_deref(),
        ) {
            services.identity.ensure_admin(email, "Administrator", password).await?;
        }

        info!(
            memory_store = config.uses_memory_store(),
            storage = %config.storage.provider,
            inference = %config.inference.provider,
            "Services ready"
        );
        Ok(services)
    }

    /// Readiness probe; the in-memory store is always ready
    pub async fn ping(&self) -> Result<()> {
        match &self.pool {
            Some(pool) => pool.ping().await,
            None => Ok(()),
        }
    }
}

/// Configured secret, or a throwaway one for in-memory development runs
fn jwt_secret(config: &AppConfig) -> Result<String> {
    match config.auth.jwt_secret.as_deref() {
        Some(secret) if !secret.is_empty() => Ok(secret.to_string()),
        _ if config.uses_memory_store() => {
            warn!("auth.jwt_secret not set; generated an ephemeral secret");
            Ok(rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(48)
                .map(char::from)
                .collect())
        }
        _ => Err(AppError::Configuration {
            message: "auth.jwt_secret is required with a persistent database".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_default_config_wires_memory_backends() {
        let mut config = AppConfig::default();
        config.auth.bootstrap_admin_email = Some("admin@clinic.test".to_string());
        config.auth.bootstrap_admin_password = Some("bootstrap-pass".to_string());

        let services = assert_ok!(Services::from_config(&config).await);
        assert_ok!(services.ping().await);

        let (token, admin) = services
            .identity
            .authenticate("admin@clinic.test", "bootstrap-pass")
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(services.identity.user_for_token(&token).await.unwrap().id, admin.id);
    }

    #[test]
    fn test_persistent_store_requires_secret() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/medvault".to_string();
        assert!(matches!(jwt_secret(&config), Err(AppError::Configuration { .. })));

        config.auth.jwt_secret = Some("configured".to_string());
        assert_eq!(jwt_secret(&config).unwrap(), "configured");
    }
}
