use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::CredentialCipher;
use crate::database::models::TenantMetadata;
use crate::database::registry::{RegistryError, TenantRegistry};
use crate::error::TenantError;

/// Pool size used when a tenant has no positive pool-size hint
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Decrypted connection parameters for one tenant database.
///
/// Lives only in memory. It has no `Serialize` impl and its `Debug` output
/// omits the password.
#[derive(Clone)]
pub struct TenantDbConfig {
    pub tenant_id: Uuid,
    pub subdomain: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    password: Zeroizing<String>,
    pub pool_size: u32,
}

impl TenantDbConfig {
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for TenantDbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantDbConfig")
            .field("tenant_id", &self.tenant_id)
            .field("subdomain", &self.subdomain)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// Turns registry rows into usable, decrypted tenant database configuration.
///
/// Performs no caching; the connection pool manager calls it once per pool
/// it builds.
pub struct TenantResolver {
    registry: Arc<dyn TenantRegistry>,
    cipher: Arc<CredentialCipher>,
    registry_timeout: Duration,
}

impl TenantResolver {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        cipher: Arc<CredentialCipher>,
        registry_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cipher,
            registry_timeout,
        }
    }

    /// Fetch the active registry row for `subdomain`.
    pub async fn lookup(&self, subdomain: &str) -> Result<TenantMetadata, TenantError> {
        let lookup = self.registry.find_by_subdomain(subdomain);
        match tokio::time::timeout(self.registry_timeout, lookup).await {
            Ok(result) => result.map_err(|e| registry_error(e, subdomain)),
            Err(_) => Err(TenantError::RegistryUnavailable(format!(
                "lookup timed out after {:?}",
                self.registry_timeout
            ))),
        }
    }

    /// Fetch the active registry row for `tenant_id`.
    pub async fn lookup_by_id(&self, tenant_id: Uuid) -> Result<TenantMetadata, TenantError> {
        let lookup = self.registry.find_by_id(tenant_id);
        match tokio::time::timeout(self.registry_timeout, lookup).await {
            Ok(result) => result.map_err(|e| registry_error(e, &tenant_id.to_string())),
            Err(_) => Err(TenantError::RegistryUnavailable(format!(
                "lookup timed out after {:?}",
                self.registry_timeout
            ))),
        }
    }

    pub async fn resolve(&self, subdomain: &str) -> Result<TenantDbConfig, TenantError> {
        let metadata = self.lookup(subdomain).await?;
        self.db_config(&metadata)
    }

    pub async fn resolve_by_id(&self, tenant_id: Uuid) -> Result<TenantDbConfig, TenantError> {
        let metadata = self.lookup_by_id(tenant_id).await?;
        self.db_config(&metadata)
    }

    /// Decrypt the stored password and settle the pool size.
    pub fn db_config(&self, metadata: &TenantMetadata) -> Result<TenantDbConfig, TenantError> {
        let password = match metadata.db_password.as_deref() {
            None | Some("") => Zeroizing::new(String::new()),
            Some(token) => self.cipher.decrypt(token).map_err(|_| {
                tracing::error!(tenant_id = %metadata.id, subdomain = %metadata.subdomain, "Failed to decrypt tenant database credentials");
                TenantError::CredentialDecryptionFailed
            })?,
        };

        let port = u16::try_from(metadata.db_port).map_err(|_| {
            TenantError::PoolCreationFailed(format!("invalid database port {}", metadata.db_port))
        })?;

        Ok(TenantDbConfig {
            tenant_id: metadata.id,
            subdomain: metadata.subdomain.clone(),
            host: metadata.db_host.clone(),
            port,
            database: metadata.db_name.clone(),
            username: metadata.db_username.clone(),
            password,
            pool_size: pool_size(metadata.db_pool_size),
        })
    }
}

fn pool_size(hint: Option<i32>) -> u32 {
    match hint {
        Some(size) if size > 0 => size as u32,
        _ => DEFAULT_POOL_SIZE,
    }
}

fn registry_error(err: RegistryError, key: &str) -> TenantError {
    match err {
        RegistryError::NotFound => TenantError::TenantNotFound(key.to_string()),
        RegistryError::Unavailable(msg) => {
            tracing::error!("Tenant registry unavailable: {}", msg);
            TenantError::RegistryUnavailable(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::TenantStatus;
    use crate::testing::{fast_cipher, tenant_row, InMemoryRegistry};

    fn resolver(registry: Arc<InMemoryRegistry>) -> TenantResolver {
        TenantResolver::new(registry, Arc::new(fast_cipher()), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn resolves_decrypted_password() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.insert(tenant_row("acme", Some("club-pass"), Some(4)));

        let config = resolver(registry).resolve("acme").await.unwrap();
        assert_eq!(config.password(), "club-pass");
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.subdomain, "acme");
    }

    #[tokio::test]
    async fn unknown_subdomain_is_tenant_not_found() {
        let registry = Arc::new(InMemoryRegistry::new());
        let err = resolver(registry).resolve("ghost").await.unwrap_err();
        assert_eq!(err, TenantError::TenantNotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn suspended_tenant_is_not_found() {
        let registry = Arc::new(InMemoryRegistry::new());
        let mut row = tenant_row("acme", Some("pw"), None);
        row.status = TenantStatus::Suspended;
        registry.insert(row);

        let err = resolver(registry).resolve("acme").await.unwrap_err();
        assert!(matches!(err, TenantError::TenantNotFound(_)));
    }

    #[tokio::test]
    async fn pool_size_defaults_when_unset_or_non_positive() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.insert(tenant_row("zero", Some("pw"), Some(0)));
        registry.insert(tenant_row("negative", Some("pw"), Some(-3)));
        registry.insert(tenant_row("absent", Some("pw"), None));
        let resolver = resolver(registry);

        for subdomain in ["zero", "negative", "absent"] {
            let config = resolver.resolve(subdomain).await.unwrap();
            assert_eq!(config.pool_size, DEFAULT_POOL_SIZE, "{subdomain}");
        }
    }

    #[tokio::test]
    async fn empty_password_bypasses_decryption() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.insert(tenant_row("open", None, None));
        let mut row = tenant_row("blank", None, None);
        row.db_password = Some(String::new());
        registry.insert(row);
        let resolver = resolver(registry);

        assert_eq!(resolver.resolve("open").await.unwrap().password(), "");
        assert_eq!(resolver.resolve("blank").await.unwrap().password(), "");
    }

    #[tokio::test]
    async fn corrupt_ciphertext_never_falls_back_to_empty_password() {
        let registry = Arc::new(InMemoryRegistry::new());
        let mut row = tenant_row("acme", None, None);
        row.db_password = Some("deadbeef:cafe".to_string());
        registry.insert(row);

        let err = resolver(registry).resolve("acme").await.unwrap_err();
        assert_eq!(err, TenantError::CredentialDecryptionFailed);
    }

    #[tokio::test]
    async fn registry_outage_is_distinct_from_not_found() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.insert(tenant_row("acme", Some("pw"), None));
        registry.set_unavailable(true);

        let err = resolver(registry).resolve("acme").await.unwrap_err();
        assert!(matches!(err, TenantError::RegistryUnavailable(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn slow_registry_times_out_as_unavailable() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.insert(tenant_row("acme", Some("pw"), None));
        registry.set_delay(Duration::from_millis(200));
        let resolver = TenantResolver::new(registry, Arc::new(fast_cipher()), Duration::from_millis(20));

        let err = resolver.resolve("acme").await.unwrap_err();
        assert!(matches!(err, TenantError::RegistryUnavailable(_)));
    }

    #[tokio::test]
    async fn resolve_by_id_counts_registry_calls() {
        let registry = Arc::new(InMemoryRegistry::new());
        let row = tenant_row("acme", Some("pw"), None);
        let id = row.id;
        registry.insert(row);
        let resolver = resolver(registry.clone());

        resolver.resolve_by_id(id).await.unwrap();
        resolver.resolve_by_id(id).await.unwrap();
        assert_eq!(registry.id_lookups(), 2);
    }

    #[test]
    fn debug_output_redacts_password() {
        let cipher = fast_cipher();
        let registry: Arc<dyn TenantRegistry> = Arc::new(InMemoryRegistry::new());
        let resolver = TenantResolver::new(registry, Arc::new(cipher), Duration::from_secs(1));
        let config = resolver.db_config(&tenant_row("acme", Some("hunter2"), None)).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
