use std::sync::Arc;

use anyhow::{bail, Context};
use tower_http::cors::CorsLayer;

use crate::app::{app, AppState};
use crate::config::config;
use crate::crypto::CredentialCipher;
use crate::database::{ConnectionPoolManager, PgConnector, PgTenantRegistry, TenantRegistry};
use crate::middleware::TenantGate;
use crate::services::TenantResolver;

pub async fn handle(port_override: Option<u16>) -> anyhow::Result<()> {
    let config = config();
    tracing::info!("Starting Club Tenancy in {:?} mode", config.environment);

    if config.security.encryption_secret.is_empty() {
        bail!("CREDENTIAL_ENCRYPTION_SECRET must be set");
    }
    if config.database.url.is_empty() {
        bail!("DATABASE_URL must be set");
    }
    if config.security.admin_token.is_empty() {
        tracing::warn!("ADMIN_API_TOKEN not set; /api/root endpoints are disabled");
    }

    let registry: Arc<dyn TenantRegistry> = Arc::new(
        PgTenantRegistry::connect(&config.database)
            .await
            .context("failed to connect to the tenant registry")?,
    );

    // Key derivation is slow; do it once here
    let cipher = Arc::new(CredentialCipher::new(
        config.security.encryption_secret.expose(),
        &config.security.kdf(),
    ));

    let resolver = Arc::new(TenantResolver::new(
        Arc::clone(&registry),
        cipher,
        config.tenancy.registry_timeout(),
    ));
    let connector = PgConnector::new(
        config.tenancy.pool_acquire_timeout(),
        config.tenancy.pool_idle_timeout(),
    );
    let manager = ConnectionPoolManager::new(connector, config.tenancy.pool_creation_timeout());
    let gate = TenantGate::new(
        resolver,
        manager.clone(),
        config.tenancy.root_domain.clone(),
        config.tenancy.tenant_header.clone(),
    );

    let state = AppState::new(gate, registry, config.security.admin_token.clone());
    let mut router = app(state);
    if config.api.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    let port = port_override.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!(
        addr = %bind_addr,
        root_domain = %config.tenancy.root_domain,
        "Club Tenancy listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    manager.close_all().await;
    tracing::info!("Tenant pools closed, shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
