use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::database::models::TenantMetadata;

/// Errors from a tenant registry lookup
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No active tenant matches. Suspended and inactive tenants land here too.
    #[error("tenant not found")]
    NotFound,

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Unavailable(err.to_string())
    }
}

/// Read-only access to the master tenant registry.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<TenantMetadata, RegistryError>;

    async fn find_by_id(&self, tenant_id: Uuid) -> Result<TenantMetadata, RegistryError>;

    async fn health_check(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}

const SELECT_TENANT: &str = r#"
    SELECT
        id, subdomain, name,
        db_host, db_port, db_name, db_username, db_password, db_pool_size,
        status, onboarding_status, onboarding_completed_at,
        created_at, updated_at
    FROM tenants
"#;

/// Registry backed by the master Postgres database
pub struct PgTenantRegistry {
    pool: PgPool,
}

impl PgTenantRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open the master pool described by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(&config.url)
            .await?;

        tracing::info!("Connected to master tenant registry");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn active_only(row: Option<TenantMetadata>) -> Result<TenantMetadata, RegistryError> {
    match row {
        Some(tenant) if tenant.is_routable() => Ok(tenant),
        _ => Err(RegistryError::NotFound),
    }
}

#[async_trait]
impl TenantRegistry for PgTenantRegistry {
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<TenantMetadata, RegistryError> {
        let sql = format!("{} WHERE subdomain = $1 AND status = 'active'", SELECT_TENANT);
        let row = sqlx::query_as::<_, TenantMetadata>(&sql)
            .bind(subdomain)
            .fetch_optional(&self.pool)
            .await?;

        active_only(row)
    }

    async fn find_by_id(&self, tenant_id: Uuid) -> Result<TenantMetadata, RegistryError> {
        let sql = format!("{} WHERE id = $1 AND status = 'active'", SELECT_TENANT);
        let row = sqlx::query_as::<_, TenantMetadata>(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        active_only(row)
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
