#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use club_tenancy::app::{app, AppState};
use club_tenancy::config::Secret;
use club_tenancy::database::models::TenantMetadata;
use club_tenancy::database::ConnectionPoolManager;
use club_tenancy::middleware::TenantGate;
use club_tenancy::services::TenantResolver;
use club_tenancy::testing::{fast_cipher, tenant_row, FakeConnector, InMemoryRegistry};

pub const ROOT_DOMAIN: &str = "cms.test";
pub const TENANT_HEADER: &str = "x-tenant-subdomain";
pub const ADMIN_TOKEN: &str = "admin-test-token";

/// In-process application wired to the in-memory doubles
pub struct TestApp {
    pub router: Router,
    pub registry: Arc<InMemoryRegistry>,
    pub connector: FakeConnector,
    pub manager: ConnectionPoolManager<FakeConnector>,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_admin_token(ADMIN_TOKEN)
}

pub fn spawn_app_with_admin_token(admin_token: &str) -> TestApp {
    let registry = Arc::new(InMemoryRegistry::new());
    let connector = FakeConnector::new();

    let resolver = Arc::new(TenantResolver::new(
        registry.clone(),
        Arc::new(fast_cipher()),
        Duration::from_secs(2),
    ));
    let manager = ConnectionPoolManager::new(connector.clone(), Duration::from_secs(5));
    let gate = TenantGate::new(resolver, manager.clone(), ROOT_DOMAIN, TENANT_HEADER);
    let state = AppState::new(gate, registry.clone(), Secret::new(admin_token));

    TestApp {
        router: app(state),
        registry,
        connector,
        manager,
    }
}

impl TestApp {
    /// Register an active tenant with a pool size of 4
    pub fn add_tenant(&self, subdomain: &str, password: &str) -> TenantMetadata {
        let tenant = tenant_row(subdomain, Some(password), Some(4));
        self.registry.insert(tenant.clone());
        tenant
    }

    pub async fn get(&self, uri: &str, host: &str) -> Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::HOST, host)
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn admin(&self, method: Method, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, ROOT_DOMAIN);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, body))
    }
}
