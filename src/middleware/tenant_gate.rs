use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::HOST, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::connector::PoolConnector;
use crate::database::manager::{ConnectionHandle, ConnectionPoolManager};
use crate::database::models::TenantMetadata;
use crate::error::{ApiError, TenantError};
use crate::services::tenant_resolver::{TenantDbConfig, TenantResolver};

use super::host::{extract_subdomain, normalize_override};

/// Everything downstream handlers need about the request's tenant.
///
/// Attached once by [`tenant_gate_middleware`] and read-only afterwards.
pub struct TenantExecutionContext<P> {
    metadata: Arc<TenantMetadata>,
    connection: ConnectionHandle<P>,
}

impl<P> std::fmt::Debug for TenantExecutionContext<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantExecutionContext")
            .field("tenant_id", &self.metadata.id)
            .field("subdomain", &self.metadata.subdomain)
            .field("connection", &self.connection)
            .finish()
    }
}

impl<P> Clone for TenantExecutionContext<P> {
    fn clone(&self) -> Self {
        Self {
            metadata: Arc::clone(&self.metadata),
            connection: Arc::clone(&self.connection),
        }
    }
}

impl<P> TenantExecutionContext<P> {
    pub fn tenant_id(&self) -> Uuid {
        self.metadata.id
    }

    pub fn subdomain(&self) -> &str {
        &self.metadata.subdomain
    }

    pub fn metadata(&self) -> &TenantMetadata {
        &self.metadata
    }

    pub fn db_config(&self) -> &TenantDbConfig {
        self.connection.config()
    }

    pub fn connection(&self) -> &ConnectionHandle<P> {
        &self.connection
    }
}

/// Where in the gate a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    NoSubdomain,
    SubdomainExtracted,
    TenantResolved,
}

impl std::fmt::Display for GateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GateStage::NoSubdomain => "no_subdomain",
            GateStage::SubdomainExtracted => "subdomain_extracted",
            GateStage::TenantResolved => "tenant_resolved",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub stage: GateStage,
    pub error: TenantError,
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        rejection.error.into()
    }
}

/// Per-request entry point: host → subdomain → tenant → connection.
pub struct TenantGate<C: PoolConnector> {
    resolver: Arc<TenantResolver>,
    manager: ConnectionPoolManager<C>,
    root_domain: String,
    tenant_header: String,
}

impl<C: PoolConnector> TenantGate<C> {
    pub fn new(
        resolver: Arc<TenantResolver>,
        manager: ConnectionPoolManager<C>,
        root_domain: impl Into<String>,
        tenant_header: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            manager,
            root_domain: root_domain.into(),
            tenant_header: tenant_header.into(),
        }
    }

    pub fn manager(&self) -> &ConnectionPoolManager<C> {
        &self.manager
    }

    /// Run every stage; either a full context or the reason it stopped.
    pub async fn admit(&self, headers: &HeaderMap) -> Result<TenantExecutionContext<C::Pool>, Rejection> {
        let subdomain = self.extract(headers)?;
        let metadata = self.resolve(&subdomain).await?;
        self.acquire(metadata).await
    }

    /// Stage 1: explicit override header first, then the Host header.
    pub fn extract(&self, headers: &HeaderMap) -> Result<String, Rejection> {
        let explicit = headers
            .get(self.tenant_header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(normalize_override);

        let subdomain = explicit.or_else(|| {
            headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .and_then(|host| extract_subdomain(host, &self.root_domain))
        });

        subdomain.ok_or(Rejection {
            stage: GateStage::NoSubdomain,
            error: TenantError::NotATenantRequest,
        })
    }

    /// Stage 2: active registry row for the subdomain.
    pub async fn resolve(&self, subdomain: &str) -> Result<TenantMetadata, Rejection> {
        self.resolver.lookup(subdomain).await.map_err(|error| {
            tracing::warn!(subdomain = %subdomain, error = %error, "Tenant resolution rejected");
            Rejection {
                stage: GateStage::SubdomainExtracted,
                error,
            }
        })
    }

    /// Stage 3: the tenant's pool, built from a fresh lookup and decrypt on a miss.
    pub async fn acquire(&self, metadata: TenantMetadata) -> Result<TenantExecutionContext<C::Pool>, Rejection> {
        let tenant_id = metadata.id;
        let resolver = Arc::clone(&self.resolver);

        let connection = self
            .manager
            .get_connection(tenant_id, move || async move { resolver.resolve_by_id(tenant_id).await })
            .await
            .map_err(|error| {
                tracing::warn!(tenant_id = %tenant_id, error = %error, "Tenant connection rejected");
                Rejection {
                    stage: GateStage::TenantResolved,
                    error,
                }
            })?;

        if connection.tenant_id() != tenant_id {
            tracing::error!(
                tenant_id = %tenant_id,
                pool_tenant_id = %connection.tenant_id(),
                "Pool handed out for the wrong tenant"
            );
            return Err(Rejection {
                stage: GateStage::TenantResolved,
                error: TenantError::ConnectionUnavailable("tenant mismatch".to_string()),
            });
        }

        Ok(TenantExecutionContext {
            metadata: Arc::new(metadata),
            connection,
        })
    }
}

/// Middleware that resolves the request's tenant and attaches its context
pub async fn tenant_gate_middleware<C: PoolConnector>(
    State(state): State<AppState<C>>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.gate.admit(request.headers()).await {
        Ok(context) => {
            tracing::debug!(tenant_id = %context.tenant_id(), subdomain = %context.subdomain(), "Tenant admitted");
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(rejection) => {
            tracing::debug!(stage = %rejection.stage, kind = rejection.error.kind(), "Request rejected by tenant gate");
            ApiError::from(rejection).into_response()
        }
    }
}
