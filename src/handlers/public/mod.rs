// handlers/public/mod.rs - Unauthenticated service endpoints

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::connector::PoolConnector;

pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Club Tenancy",
            "version": version,
            "description": "Per-tenant database routing behind subdomains",
            "endpoints": {
                "health": "/health (public)",
                "tenant": "/api/tenant/* (tenant subdomain required)",
                "root": "/api/root/tenant/* (admin token required)",
            }
        }
    }))
}

/// Liveness plus master registry reachability
pub async fn health<C: PoolConnector>(State(state): State<AppState<C>>) -> (StatusCode, Json<Value>) {
    let now = chrono::Utc::now();
    let pools = state.manager().get_all_metrics().await.len();

    match state.registry.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "registry": "ok",
                    "tenant_pools": pools
                }
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Registry health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "registry unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "tenant_pools": pools
                    }
                })),
            )
        }
    }
}
