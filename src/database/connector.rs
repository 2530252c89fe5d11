use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres};

use crate::error::TenantError;
use crate::services::tenant_resolver::TenantDbConfig;

/// Point-in-time connection counts of one tenant pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolOccupancy {
    pub active: u32,
    pub idle: u32,
}

/// Why a connection could not be checked out of a live pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// Every connection stayed busy for the whole acquire timeout
    Exhausted,
    Closed,
    Other(String),
}

/// Opens, inspects and closes the pool behind one tenant.
#[async_trait]
pub trait PoolConnector: Send + Sync + 'static {
    type Pool: Clone + Send + Sync + 'static;
    type Conn: Send + 'static;

    async fn connect(&self, config: &TenantDbConfig) -> Result<Self::Pool, TenantError>;

    /// Check out one connection, waiting no longer than the pool's acquire timeout.
    async fn acquire(&self, pool: &Self::Pool) -> Result<Self::Conn, AcquireError>;

    /// Round-trip a trivial query over `conn`.
    async fn ping(&self, conn: &mut Self::Conn) -> Result<(), TenantError>;

    async fn close(&self, pool: &Self::Pool);

    fn occupancy(&self, pool: &Self::Pool) -> PoolOccupancy;

    fn is_closed(&self, _pool: &Self::Pool) -> bool {
        false
    }
}

/// Builds one `PgPool` per tenant database
#[derive(Debug, Clone)]
pub struct PgConnector {
    acquire_timeout: Duration,
    idle_timeout: Duration,
}

impl PgConnector {
    pub fn new(acquire_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            acquire_timeout,
            idle_timeout,
        }
    }

    fn connect_options(config: &TenantDbConfig) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username);

        if config.password().is_empty() {
            options
        } else {
            options.password(config.password())
        }
    }
}

#[async_trait]
impl PoolConnector for PgConnector {
    type Pool = PgPool;
    type Conn = PoolConnection<Postgres>;

    async fn connect(&self, config: &TenantDbConfig) -> Result<PgPool, TenantError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .connect_with(Self::connect_options(config))
            .await
            .map_err(|e| TenantError::PoolCreationFailed(e.to_string()))?;

        Ok(pool)
    }

    async fn acquire(&self, pool: &PgPool) -> Result<PoolConnection<Postgres>, AcquireError> {
        pool.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => AcquireError::Exhausted,
            sqlx::Error::PoolClosed => AcquireError::Closed,
            other => AcquireError::Other(other.to_string()),
        })
    }

    async fn ping(&self, conn: &mut PoolConnection<Postgres>) -> Result<(), TenantError> {
        sqlx::query("SELECT 1")
            .execute(&mut **conn)
            .await
            .map(|_| ())
            .map_err(|e| TenantError::ConnectionUnavailable(e.to_string()))
    }

    async fn close(&self, pool: &PgPool) {
        pool.close().await;
    }

    fn occupancy(&self, pool: &PgPool) -> PoolOccupancy {
        let size = pool.size();
        let idle = pool.num_idle() as u32;
        PoolOccupancy {
            active: size.saturating_sub(idle),
            idle,
        }
    }

    fn is_closed(&self, pool: &PgPool) -> bool {
        pool.is_closed()
    }
}
