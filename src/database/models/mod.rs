pub mod tenant;

pub use tenant::{TenantMetadata, TenantStatus};
