pub mod admin;
pub mod host;
pub mod response;
pub mod tenant_gate;

pub use admin::admin_auth_middleware;
pub use host::extract_subdomain;
pub use response::{ApiResponse, ApiResult};
pub use tenant_gate::{tenant_gate_middleware, GateStage, Rejection, TenantExecutionContext, TenantGate};
