pub mod connector;
pub mod manager;
pub mod models;
pub mod registry;

pub use connector::{AcquireError, PgConnector, PoolConnector, PoolOccupancy};
pub use manager::{ConnectionHandle, ConnectionPoolManager, PooledConnectionEntry, TenantMetrics};
pub use registry::{PgTenantRegistry, RegistryError, TenantRegistry};
