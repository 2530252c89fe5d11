//! Test doubles for the registry and the pool connector.
//!
//! Compiled for unit tests and, through the `testing` feature, for the
//! integration tests under `tests/`.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::crypto::{CredentialCipher, KdfParams};
use crate::database::connector::{AcquireError, PoolConnector, PoolOccupancy};
use crate::database::models::{TenantMetadata, TenantStatus};
use crate::database::registry::{RegistryError, TenantRegistry};
use crate::error::TenantError;
use crate::services::tenant_resolver::{TenantDbConfig, TenantResolver};

pub const TEST_SECRET: &str = "test-shared-secret";

// Poisoning from a panicked test is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cipher with a cheap KDF so tests stay fast
pub fn fast_cipher() -> CredentialCipher {
    CredentialCipher::new(
        TEST_SECRET,
        &KdfParams {
            iterations: 10,
            salt: "test-salt".to_string(),
        },
    )
}

/// Active registry row whose password (if any) is sealed with [`fast_cipher`]
pub fn tenant_row(subdomain: &str, password: Option<&str>, pool_size: Option<i32>) -> TenantMetadata {
    let now = Utc::now();
    TenantMetadata {
        id: Uuid::new_v4(),
        subdomain: subdomain.to_string(),
        name: format!("{} club", subdomain),
        db_host: "localhost".to_string(),
        db_port: 5432,
        db_name: format!("club_{}", subdomain),
        db_username: format!("{}_user", subdomain),
        db_password: password.map(|p| fast_cipher().encrypt(p).expect("test password encrypts")),
        db_pool_size: pool_size,
        status: TenantStatus::Active,
        onboarding_status: Some("completed".to_string()),
        onboarding_completed_at: Some(now),
        created_at: now,
        updated_at: now,
    }
}

/// Decrypted config for `tenant_id` with a pool size of 5
pub fn db_config(tenant_id: Uuid, subdomain: &str, password: &str) -> TenantDbConfig {
    let mut row = tenant_row(subdomain, Some(password), Some(5));
    row.id = tenant_id;
    let registry: Arc<dyn TenantRegistry> = Arc::new(InMemoryRegistry::new());
    TenantResolver::new(registry, Arc::new(fast_cipher()), Duration::from_secs(1))
        .db_config(&row)
        .expect("test row decrypts")
}

/// Registry over a map, applying the same active-only rule as the Postgres one
#[derive(Default)]
pub struct InMemoryRegistry {
    tenants: Mutex<HashMap<Uuid, TenantMetadata>>,
    subdomain_lookups: AtomicUsize,
    id_lookups: AtomicUsize,
    unavailable: AtomicBool,
    delay: Mutex<Duration>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: TenantMetadata) {
        lock(&self.tenants).insert(tenant.id, tenant);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = delay;
    }

    pub fn subdomain_lookups(&self) -> usize {
        self.subdomain_lookups.load(Ordering::SeqCst)
    }

    pub fn id_lookups(&self) -> usize {
        self.id_lookups.load(Ordering::SeqCst)
    }

    /// Lookups of either kind
    pub fn lookups(&self) -> usize {
        self.subdomain_lookups() + self.id_lookups()
    }

    async fn find(&self, matches: impl Fn(&TenantMetadata) -> bool) -> Result<TenantMetadata, RegistryError> {
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("connection refused".to_string()));
        }
        lock(&self.tenants)
            .values()
            .find(|t| matches(t) && t.is_routable())
            .cloned()
            .ok_or(RegistryError::NotFound)
    }
}

#[async_trait]
impl TenantRegistry for InMemoryRegistry {
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<TenantMetadata, RegistryError> {
        self.subdomain_lookups.fetch_add(1, Ordering::SeqCst);
        self.find(|t| t.subdomain == subdomain).await
    }

    async fn find_by_id(&self, tenant_id: Uuid) -> Result<TenantMetadata, RegistryError> {
        self.id_lookups.fetch_add(1, Ordering::SeqCst);
        self.find(|t| t.id == tenant_id).await
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

/// Stand-in for a tenant pool
#[derive(Debug, Clone)]
pub struct FakePool {
    pub id: usize,
    pub tenant_id: Uuid,
    pub password: String,
    pub size: u32,
    closed: Arc<AtomicBool>,
}

impl FakePool {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Connection checked out of a [`FakePool`]
#[derive(Debug)]
pub struct FakeConn {
    pub pool_id: usize,
}

#[derive(Default)]
struct FakeConnectorState {
    connects: AtomicUsize,
    closes: AtomicUsize,
    pings: AtomicUsize,
    fail_next: AtomicBool,
    fail_next_query: AtomicBool,
    exhausted: AtomicBool,
    delay: Mutex<Duration>,
}

/// Connector that counts pool creations; clones share counters
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<FakeConnectorState>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.state.delay) = delay;
    }

    pub fn fail_next_connect(&self) {
        self.state.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_query(&self) {
        self.state.fail_next_query.store(true, Ordering::SeqCst);
    }

    /// While set, every acquire behaves like a pool whose connections are all checked out.
    pub fn set_exhausted(&self, exhausted: bool) {
        self.state.exhausted.store(exhausted, Ordering::SeqCst);
    }

    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolConnector for FakeConnector {
    type Pool = FakePool;
    type Conn = FakeConn;

    async fn connect(&self, config: &TenantDbConfig) -> Result<FakePool, TenantError> {
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.state.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TenantError::PoolCreationFailed("connection refused".to_string()));
        }
        Ok(FakePool {
            id,
            tenant_id: config.tenant_id,
            password: config.password().to_string(),
            size: config.pool_size,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn acquire(&self, pool: &FakePool) -> Result<FakeConn, AcquireError> {
        if pool.is_closed() {
            return Err(AcquireError::Closed);
        }
        if self.state.exhausted.load(Ordering::SeqCst) {
            return Err(AcquireError::Exhausted);
        }
        Ok(FakeConn { pool_id: pool.id })
    }

    async fn ping(&self, _conn: &mut FakeConn) -> Result<(), TenantError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_next_query.swap(false, Ordering::SeqCst) {
            return Err(TenantError::ConnectionUnavailable("query failed".to_string()));
        }
        Ok(())
    }

    async fn close(&self, pool: &FakePool) {
        pool.closed.store(true, Ordering::SeqCst);
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn occupancy(&self, pool: &FakePool) -> PoolOccupancy {
        PoolOccupancy {
            active: 0,
            idle: pool.size,
        }
    }

    fn is_closed(&self, pool: &FakePool) -> bool {
        pool.is_closed()
    }
}
