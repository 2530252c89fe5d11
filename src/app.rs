use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::Secret;
use crate::database::connector::PoolConnector;
use crate::database::manager::ConnectionPoolManager;
use crate::database::registry::TenantRegistry;
use crate::handlers::{public, root, tenant};
use crate::middleware::{admin_auth_middleware, tenant_gate_middleware, TenantGate};

/// Shared state handed to every handler and middleware
pub struct AppState<C: PoolConnector> {
    pub gate: Arc<TenantGate<C>>,
    pub registry: Arc<dyn TenantRegistry>,
    pub admin_token: Secret,
}

impl<C: PoolConnector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            registry: Arc::clone(&self.registry),
            admin_token: self.admin_token.clone(),
        }
    }
}

impl<C: PoolConnector> AppState<C> {
    pub fn new(gate: TenantGate<C>, registry: Arc<dyn TenantRegistry>, admin_token: Secret) -> Self {
        Self {
            gate: Arc::new(gate),
            registry,
            admin_token,
        }
    }

    pub fn manager(&self) -> &ConnectionPoolManager<C> {
        self.gate.manager()
    }
}

pub fn app<C: PoolConnector>(state: AppState<C>) -> Router {
    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health::<C>))
        // Tenant-scoped (gate attaches TenantExecutionContext)
        .merge(tenant_routes(state.clone()))
        // Operator endpoints
        .merge(root_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn tenant_routes<C: PoolConnector>(state: AppState<C>) -> Router<AppState<C>> {
    Router::new()
        .route("/api/tenant/whoami", get(tenant::whoami::<C>))
        .route_layer(middleware::from_fn_with_state(state, tenant_gate_middleware::<C>))
}

fn root_routes<C: PoolConnector>(state: AppState<C>) -> Router<AppState<C>> {
    Router::new()
        .route("/api/root/tenant/metrics", get(root::tenant::metrics_all::<C>))
        .route("/api/root/tenant/:id/metrics", get(root::tenant::metrics_one::<C>))
        .route("/api/root/tenant/:id/pool", delete(root::tenant::evict_pool::<C>))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware::<C>))
}
