// handlers/root/tenant/metrics.rs - Pool metrics for operators

use axum::extract::{Path, State};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::connector::PoolConnector;
use crate::database::manager::TenantMetrics;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct PoolSummary {
    pub pools: usize,
    pub tenants: Vec<TenantMetrics>,
}

/// GET /api/root/tenant/metrics - every live pool, ordered by subdomain
pub async fn metrics_all<C: PoolConnector>(State(state): State<AppState<C>>) -> ApiResult<PoolSummary> {
    let mut tenants: Vec<TenantMetrics> = state.manager().get_all_metrics().await.into_values().collect();
    tenants.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));

    Ok(ApiResponse::success(PoolSummary {
        pools: tenants.len(),
        tenants,
    }))
}

/// GET /api/root/tenant/:id/metrics
pub async fn metrics_one<C: PoolConnector>(
    State(state): State<AppState<C>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<TenantMetrics> {
    state
        .manager()
        .get_metrics(tenant_id)
        .await
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::not_found(format!("No live pool for tenant {}", tenant_id)))
}
