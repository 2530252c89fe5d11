pub mod tenant_resolver;

pub use tenant_resolver::{TenantDbConfig, TenantResolver, DEFAULT_POOL_SIZE};
