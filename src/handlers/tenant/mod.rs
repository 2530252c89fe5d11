// handlers/tenant/mod.rs - Tenant-scoped handlers
//
// Every route here sits behind tenant_gate_middleware, so handlers can rely on
// a TenantExecutionContext being present in the request extensions.

pub mod whoami; // GET /api/tenant/whoami

pub use whoami::whoami;
