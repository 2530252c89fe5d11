// handlers/tenant/whoami.rs - GET /api/tenant/whoami handler

use axum::extract::{Extension, State};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::connector::PoolConnector;
use crate::middleware::{ApiResponse, ApiResult, TenantExecutionContext};

#[derive(Debug, Serialize)]
pub struct TenantIdentity {
    pub tenant_id: Uuid,
    pub subdomain: String,
    pub name: String,
    pub database: String,
    pub pool_size: u32,
    pub onboarding_status: Option<String>,
}

/// Which tenant the request was routed to. Never includes credentials.
///
/// Round-trips a query on the tenant's own pool first, so an exhausted or
/// broken pool is refused here instead of reporting a healthy identity.
pub async fn whoami<C: PoolConnector>(
    State(state): State<AppState<C>>,
    Extension(tenant): Extension<TenantExecutionContext<C::Pool>>,
) -> ApiResult<TenantIdentity> {
    state.manager().ping(tenant.connection()).await?;

    let db = tenant.db_config();

    Ok(ApiResponse::success(TenantIdentity {
        tenant_id: tenant.tenant_id(),
        subdomain: tenant.subdomain().to_string(),
        name: tenant.metadata().name.clone(),
        database: db.database.clone(),
        pool_size: db.pool_size,
        onboarding_status: tenant.metadata().onboarding_status.clone(),
    }))
}
