//! Process-wide cache of live tenant pools.
//!
//! Every tenant id maps to at most one slot: either a ready
//! [`PooledConnectionEntry`] or an in-flight creation that concurrent callers
//! join instead of starting their own. Creation runs on its own task, so a
//! caller that goes away never cancels it for the others; only `evict` does.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::connector::{AcquireError, PoolConnector, PoolOccupancy};
use crate::error::TenantError;
use crate::services::tenant_resolver::TenantDbConfig;

/// Shared handle to a tenant's live pool
pub type ConnectionHandle<P> = Arc<PooledConnectionEntry<P>>;

type CreationResult<P> = Result<ConnectionHandle<P>, TenantError>;
type Creation<P> = Shared<BoxFuture<'static, CreationResult<P>>>;

const EVICTED_DURING_CREATION: &str = "tenant was evicted during pool creation";

fn nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// A tenant's live pool plus its bookkeeping
pub struct PooledConnectionEntry<P> {
    tenant_id: Uuid,
    config: Arc<TenantDbConfig>,
    pool: P,
    created_at: DateTime<Utc>,
    last_used_ns: AtomicI64,
    requests: AtomicU64,
    queries: AtomicU64,
    errors: AtomicU64,
    healthy: AtomicBool,
}

impl<P> std::fmt::Debug for PooledConnectionEntry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnectionEntry")
            .field("tenant_id", &self.tenant_id)
            .field("subdomain", &self.config.subdomain)
            .field("created_at", &self.created_at)
            .field("healthy", &self.is_healthy())
            .finish_non_exhaustive()
    }
}

impl<P> PooledConnectionEntry<P> {
    fn new(config: TenantDbConfig, pool: P) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: config.tenant_id,
            config: Arc::new(config),
            pool,
            created_at: now,
            last_used_ns: AtomicI64::new(nanos(now)),
            requests: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn subdomain(&self) -> &str {
        &self.config.subdomain
    }

    /// Configuration this pool was opened with
    pub fn config(&self) -> &Arc<TenantDbConfig> {
        &self.config
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used_at(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.last_used_ns.load(Ordering::Relaxed))
            .max(self.created_at)
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Flag the pool as broken; the next lookup rebuilds it.
    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Release);
    }

    /// Count `result` as one query, and as an error if it failed.
    pub fn track<T, E>(&self, result: Result<T, E>) -> Result<T, E> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            self.record_error();
        }
        result
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn touch(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.last_used_ns
            .store(nanos(Utc::now()), Ordering::Relaxed);
    }

    fn metrics(&self, occupancy: PoolOccupancy) -> TenantMetrics {
        TenantMetrics {
            tenant_id: self.tenant_id,
            subdomain: self.config.subdomain.clone(),
            requests: self.requests.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            active_connections: occupancy.active,
            idle_connections: occupancy.idle,
            pool_size: self.config.pool_size,
            healthy: self.is_healthy(),
            created_at: self.created_at,
            last_used_at: self.last_used_at(),
        }
    }
}

/// Operational snapshot of one tenant pool
#[derive(Debug, Clone, Serialize)]
pub struct TenantMetrics {
    pub tenant_id: Uuid,
    pub subdomain: String,
    pub requests: u64,
    pub queries: u64,
    pub errors: u64,
    pub active_connections: u32,
    pub idle_connections: u32,
    pub pool_size: u32,
    pub healthy: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

enum Slot<P> {
    Ready(ConnectionHandle<P>),
    Creating {
        generation: u64,
        creation: Creation<P>,
        task: AbortHandle,
    },
}

struct ManagerInner<C: PoolConnector> {
    connector: C,
    slots: RwLock<HashMap<Uuid, Slot<C::Pool>>>,
    next_generation: AtomicU64,
    creation_timeout: Duration,
}

/// Owns every tenant pool in the process. Cheap to clone.
pub struct ConnectionPoolManager<C: PoolConnector> {
    inner: Arc<ManagerInner<C>>,
}

impl<C: PoolConnector> Clone for ConnectionPoolManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: PoolConnector> ConnectionPoolManager<C> {
    pub fn new(connector: C, creation_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                connector,
                slots: RwLock::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                creation_timeout,
            }),
        }
    }

    /// Return the tenant's pool, creating it at most once across concurrent callers.
    ///
    /// `provider` is only invoked when this call is the one that starts a
    /// creation; it should fetch fresh configuration (registry lookup and
    /// decrypt) for `tenant_id`.
    pub async fn get_connection<F, Fut>(
        &self,
        tenant_id: Uuid,
        provider: F,
    ) -> Result<ConnectionHandle<C::Pool>, TenantError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<TenantDbConfig, TenantError>> + Send + 'static,
    {
        // Fast path: read lock only
        {
            let slots = self.inner.slots.read().await;
            if let Some(Slot::Ready(entry)) = slots.get(&tenant_id) {
                if self.inner.is_usable(entry) {
                    entry.touch();
                    return Ok(Arc::clone(entry));
                }
            }
        }

        let creation = {
            let mut slots = self.inner.slots.write().await;
            match slots.get(&tenant_id) {
                Some(Slot::Ready(entry)) if self.inner.is_usable(entry) => {
                    entry.touch();
                    return Ok(Arc::clone(entry));
                }
                Some(Slot::Creating { creation, .. }) => creation.clone(),
                _ => {
                    let stale = match slots.remove(&tenant_id) {
                        Some(Slot::Ready(entry)) => Some(entry),
                        _ => None,
                    };

                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    let (creation, task) = self.spawn_creation(tenant_id, generation, provider);
                    slots.insert(
                        tenant_id,
                        Slot::Creating {
                            generation,
                            creation: creation.clone(),
                            task,
                        },
                    );

                    if let Some(stale) = stale {
                        warn!(tenant_id = %tenant_id, "Replacing unhealthy tenant pool");
                        let inner = Arc::clone(&self.inner);
                        tokio::spawn(async move {
                            inner.connector.close(stale.pool()).await;
                        });
                    }

                    creation
                }
            }
        };

        let entry = creation.await?;
        entry.touch();
        Ok(entry)
    }

    fn spawn_creation<F, Fut>(
        &self,
        tenant_id: Uuid,
        generation: u64,
        provider: F,
    ) -> (Creation<C::Pool>, AbortHandle)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<TenantDbConfig, TenantError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let attempt = tokio::time::timeout(inner.creation_timeout, inner.create_entry(provider));
            let outcome = match AssertUnwindSafe(attempt).catch_unwind().await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(TenantError::PoolCreationFailed(format!(
                    "timed out after {:?}",
                    inner.creation_timeout
                ))),
                Err(_) => Err(TenantError::PoolCreationFailed(
                    "pool creation panicked".to_string(),
                )),
            };
            inner.finish_creation(tenant_id, generation, outcome).await
        });
        let abort = task.abort_handle();

        let creation = async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(TenantError::ConnectionUnavailable(
                    EVICTED_DURING_CREATION.to_string(),
                )),
                Err(e) => Err(TenantError::PoolCreationFailed(e.to_string())),
            }
        }
        .boxed()
        .shared();

        (creation, abort)
    }

    /// Drop the tenant's pool (or cancel its in-flight creation) and close it.
    ///
    /// Returns whether anything was cached for the tenant.
    pub async fn evict(&self, tenant_id: Uuid) -> bool {
        let removed = self.inner.slots.write().await.remove(&tenant_id);
        match removed {
            Some(Slot::Ready(entry)) => {
                entry.mark_unhealthy();
                self.inner.connector.close(entry.pool()).await;
                info!(tenant_id = %tenant_id, subdomain = %entry.subdomain(), "Evicted tenant pool");
                true
            }
            Some(Slot::Creating { task, .. }) => {
                task.abort();
                info!(tenant_id = %tenant_id, "Evicted tenant during pool creation");
                true
            }
            None => false,
        }
    }

    /// Check out one connection from the tenant's pool.
    ///
    /// Exhaustion surfaces as `ConnectionUnavailable` once the pool's acquire
    /// timeout passes; a closed pool also flags the entry for rebuilding.
    pub async fn acquire(&self, entry: &PooledConnectionEntry<C::Pool>) -> Result<C::Conn, TenantError> {
        match self.inner.connector.acquire(entry.pool()).await {
            Ok(conn) => Ok(conn),
            Err(AcquireError::Exhausted) => {
                entry.record_error();
                warn!(tenant_id = %entry.tenant_id(), "Tenant pool exhausted");
                Err(TenantError::ConnectionUnavailable("pool exhausted".to_string()))
            }
            Err(AcquireError::Closed) => {
                entry.mark_unhealthy();
                Err(TenantError::ConnectionUnavailable("pool closed".to_string()))
            }
            Err(AcquireError::Other(msg)) => {
                entry.record_error();
                Err(TenantError::ConnectionUnavailable(msg))
            }
        }
    }

    /// Round-trip a trivial query on the tenant's pool, counted in its metrics.
    pub async fn ping(&self, entry: &PooledConnectionEntry<C::Pool>) -> Result<(), TenantError> {
        let mut conn = self.acquire(entry).await?;
        entry.track(self.inner.connector.ping(&mut conn).await)
    }

    pub async fn get_metrics(&self, tenant_id: Uuid) -> Option<TenantMetrics> {
        let slots = self.inner.slots.read().await;
        match slots.get(&tenant_id) {
            Some(Slot::Ready(entry)) => Some(self.inner.metrics(entry)),
            _ => None,
        }
    }

    /// Snapshot of every ready tenant pool. In-flight creations are not listed.
    pub async fn get_all_metrics(&self) -> HashMap<Uuid, TenantMetrics> {
        let slots = self.inner.slots.read().await;
        slots
            .iter()
            .filter_map(|(tenant_id, slot)| match slot {
                Slot::Ready(entry) => Some((*tenant_id, self.inner.metrics(entry))),
                Slot::Creating { .. } => None,
            })
            .collect()
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all(&self) {
        let drained: Vec<(Uuid, Slot<C::Pool>)> = self.inner.slots.write().await.drain().collect();
        for (tenant_id, slot) in drained {
            match slot {
                Slot::Ready(entry) => {
                    entry.mark_unhealthy();
                    self.inner.connector.close(entry.pool()).await;
                    info!(tenant_id = %tenant_id, "Closed tenant pool");
                }
                Slot::Creating { task, .. } => task.abort(),
            }
        }
    }
}

impl<C: PoolConnector> ManagerInner<C> {
    fn is_usable(&self, entry: &PooledConnectionEntry<C::Pool>) -> bool {
        entry.is_healthy() && !self.connector.is_closed(entry.pool())
    }

    fn metrics(&self, entry: &PooledConnectionEntry<C::Pool>) -> TenantMetrics {
        entry.metrics(self.connector.occupancy(entry.pool()))
    }

    async fn create_entry<F, Fut>(&self, provider: F) -> CreationResult<C::Pool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TenantDbConfig, TenantError>>,
    {
        let config = provider().await?;
        let pool = self.connector.connect(&config).await?;
        Ok(Arc::new(PooledConnectionEntry::new(config, pool)))
    }

    async fn finish_creation(
        &self,
        tenant_id: Uuid,
        generation: u64,
        outcome: CreationResult<C::Pool>,
    ) -> CreationResult<C::Pool> {
        let mut slots = self.slots.write().await;
        let current = matches!(
            slots.get(&tenant_id),
            Some(Slot::Creating { generation: g, .. }) if *g == generation
        );

        match outcome {
            Ok(entry) if current => {
                slots.insert(tenant_id, Slot::Ready(Arc::clone(&entry)));
                info!(
                    tenant_id = %tenant_id,
                    subdomain = %entry.subdomain(),
                    pool_size = entry.config().pool_size,
                    "Created tenant database pool"
                );
                Ok(entry)
            }
            Ok(entry) => {
                drop(slots);
                self.connector.close(entry.pool()).await;
                warn!(tenant_id = %tenant_id, "Discarded tenant pool created across an eviction");
                Err(TenantError::ConnectionUnavailable(
                    EVICTED_DURING_CREATION.to_string(),
                ))
            }
            Err(err) => {
                if current {
                    slots.remove(&tenant_id);
                }
                warn!(tenant_id = %tenant_id, error = %err, "Tenant pool creation failed");
                Err(err)
            }
        }
    }
}
