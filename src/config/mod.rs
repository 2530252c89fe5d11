use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::crypto::{KdfParams, DEFAULT_KDF_ITERATIONS, DEFAULT_KDF_SALT};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub tenancy: TenancyConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Application root domain; tenants live one or more labels below it
    pub root_domain: String,
    /// Header that lets non-browser clients name their tenant explicitly
    pub tenant_header: String,
    pub pool_creation_timeout_secs: u64,
    pub registry_timeout_secs: u64,
    pub pool_acquire_timeout_secs: u64,
    pub pool_idle_timeout_secs: u64,
}

impl TenancyConfig {
    pub fn pool_creation_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_creation_timeout_secs)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }

    pub fn pool_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_acquire_timeout_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

/// Master registry database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(skip)]
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip)]
    pub encryption_secret: Secret,
    pub kdf_iterations: u32,
    pub kdf_salt: String,
    #[serde(skip)]
    pub admin_token: Secret,
}

impl SecurityConfig {
    pub fn kdf(&self) -> KdfParams {
        KdfParams {
            iterations: self.kdf_iterations,
            salt: self.kdf_salt.clone(),
        }
    }
}

/// String that never shows up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(<unset>)")
        } else {
            f.write_str("Secret(***)")
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Some(v) = env::var("APP_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_CORS") {
            self.api.enable_cors = v.parse().unwrap_or(self.api.enable_cors);
        }

        // Tenancy overrides
        if let Ok(v) = env::var("APP_ROOT_DOMAIN") {
            self.tenancy.root_domain = v.trim().to_ascii_lowercase();
        }
        if let Ok(v) = env::var("TENANT_HEADER") {
            self.tenancy.tenant_header = v.trim().to_ascii_lowercase();
        }
        if let Ok(v) = env::var("TENANT_POOL_CREATION_TIMEOUT_SECS") {
            self.tenancy.pool_creation_timeout_secs = positive_or(&v, self.tenancy.pool_creation_timeout_secs);
        }
        if let Ok(v) = env::var("TENANT_REGISTRY_TIMEOUT_SECS") {
            self.tenancy.registry_timeout_secs = positive_or(&v, self.tenancy.registry_timeout_secs);
        }
        if let Ok(v) = env::var("TENANT_POOL_ACQUIRE_TIMEOUT_SECS") {
            self.tenancy.pool_acquire_timeout_secs = positive_or(&v, self.tenancy.pool_acquire_timeout_secs);
        }
        if let Ok(v) = env::var("TENANT_POOL_IDLE_TIMEOUT_SECS") {
            self.tenancy.pool_idle_timeout_secs = positive_or(&v, self.tenancy.pool_idle_timeout_secs);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = positive_or(&v, self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = positive_or(&v, self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("CREDENTIAL_ENCRYPTION_SECRET") {
            self.security.encryption_secret = Secret::new(v);
        }
        if let Ok(v) = env::var("CREDENTIAL_KDF_ITERATIONS") {
            self.security.kdf_iterations = positive_or(&v, self.security.kdf_iterations);
        }
        if let Ok(v) = env::var("CREDENTIAL_KDF_SALT") {
            self.security.kdf_salt = v;
        }
        if let Ok(v) = env::var("ADMIN_API_TOKEN") {
            self.security.admin_token = Secret::new(v.trim());
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                port: 3000,
                enable_cors: true,
            },
            tenancy: TenancyConfig {
                root_domain: "localhost".to_string(),
                tenant_header: "x-tenant-subdomain".to_string(),
                pool_creation_timeout_secs: 30,
                registry_timeout_secs: 10,
                pool_acquire_timeout_secs: 10,
                pool_idle_timeout_secs: 600,
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                encryption_secret: Secret::default(),
                kdf_iterations: DEFAULT_KDF_ITERATIONS,
                kdf_salt: DEFAULT_KDF_SALT.to_string(),
                admin_token: Secret::default(),
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                port: 3000,
                enable_cors: true,
            },
            tenancy: TenancyConfig {
                root_domain: "staging.example.com".to_string(),
                tenant_header: "x-tenant-subdomain".to_string(),
                pool_creation_timeout_secs: 15,
                registry_timeout_secs: 5,
                pool_acquire_timeout_secs: 5,
                pool_idle_timeout_secs: 300,
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                encryption_secret: Secret::default(),
                kdf_iterations: DEFAULT_KDF_ITERATIONS,
                kdf_salt: DEFAULT_KDF_SALT.to_string(),
                admin_token: Secret::default(),
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                port: 3000,
                enable_cors: false,
            },
            tenancy: TenancyConfig {
                root_domain: "app.example.com".to_string(),
                tenant_header: "x-tenant-subdomain".to_string(),
                pool_creation_timeout_secs: 10,
                registry_timeout_secs: 3,
                pool_acquire_timeout_secs: 3,
                pool_idle_timeout_secs: 300,
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                encryption_secret: Secret::default(),
                kdf_iterations: DEFAULT_KDF_ITERATIONS,
                kdf_salt: DEFAULT_KDF_SALT.to_string(),
                admin_token: Secret::default(),
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

/// Parse a strictly positive number, keeping `current` for zero or garbage.
fn positive_or<T>(value: &str, current: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => parsed,
        _ => {
            tracing::warn!(value, "Ignoring non-positive configuration override");
            current
        }
    }
}

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
