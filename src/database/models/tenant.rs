use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of a tenant in the master registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Inactive,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Inactive => "inactive",
        }
    }
}

impl TryFrom<String> for TenantStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "inactive" => Ok(TenantStatus::Inactive),
            other => Err(format!("unknown tenant status '{}'", other)),
        }
    }
}

/// Snapshot of one row of the master `tenants` table.
///
/// `db_password` holds the ciphertext token, never plaintext.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TenantMetadata {
    pub id: Uuid,
    pub subdomain: String,
    pub name: String,
    pub db_host: String,
    pub db_port: i32,
    pub db_name: String,
    pub db_username: String,
    #[serde(skip_serializing)]
    pub db_password: Option<String>,
    pub db_pool_size: Option<i32>,
    #[sqlx(try_from = "String")]
    pub status: TenantStatus,
    pub onboarding_status: Option<String>,
    pub onboarding_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantMetadata {
    /// Only active tenants may be routed to.
    pub fn is_routable(&self) -> bool {
        self.status == TenantStatus::Active
    }
}
