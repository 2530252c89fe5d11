// handlers/root/tenant/mod.rs - Tenant pool operations

pub mod evict;   // DELETE /api/root/tenant/:id/pool
pub mod metrics; // GET /api/root/tenant/metrics, GET /api/root/tenant/:id/metrics

pub use evict::evict_pool;
pub use metrics::{metrics_all, metrics_one};
