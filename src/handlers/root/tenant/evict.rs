// handlers/root/tenant/evict.rs - DELETE /api/root/tenant/:id/pool handler
//
// Used after a tenant's credentials are rotated or its database moves: the
// next request for the tenant re-reads the registry and opens a fresh pool.

use axum::extract::{Path, State};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::connector::PoolConnector;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct Eviction {
    pub tenant_id: Uuid,
    pub evicted: bool,
}

pub async fn evict_pool<C: PoolConnector>(
    State(state): State<AppState<C>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Eviction> {
    let evicted = state.manager().evict(tenant_id).await;
    tracing::info!(tenant_id = %tenant_id, evicted, "Admin pool eviction");

    Ok(ApiResponse::success(Eviction { tenant_id, evicted }))
}
