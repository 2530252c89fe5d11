mod common;

use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use club_tenancy::database::models::TenantStatus;

use common::{spawn_app, TENANT_HEADER};

#[tokio::test]
async fn whoami_routes_each_subdomain_to_its_own_tenant() -> Result<()> {
    let app = spawn_app();
    let acme = app.add_tenant("acme", "acme-db-pass");
    let beta = app.add_tenant("beta", "beta-db-pass");

    let (status, body) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["subdomain"], "acme");
    assert_eq!(body["data"]["tenant_id"], acme.id.to_string());
    assert_eq!(body["data"]["database"], "club_acme");
    assert_eq!(body["data"]["pool_size"], 4);

    let (status, body) = app.get("/api/tenant/whoami", "beta.cms.test:8080").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tenant_id"], beta.id.to_string());

    assert_eq!(app.connector.connects(), 2);
    Ok(())
}

#[tokio::test]
async fn responses_never_carry_credentials() -> Result<()> {
    let app = spawn_app();
    let acme = app.add_tenant("acme", "acme-db-pass");

    let (_, body) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    let text = body.to_string();
    assert!(!text.contains("acme-db-pass"));
    assert!(!text.contains(acme.db_password.as_deref().unwrap()));
    assert!(!text.contains("password"));
    Ok(())
}

#[tokio::test]
async fn main_domain_is_not_a_tenant_request() -> Result<()> {
    let app = spawn_app();
    app.add_tenant("acme", "pw");

    for host in ["cms.test", "localhost:3000", "127.0.0.1"] {
        let (status, body) = app.get("/api/tenant/whoami", host).await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "host {}", host);
        assert_eq!(body["code"], "NOT_A_TENANT_REQUEST");
    }
    assert_eq!(app.registry.lookups(), 0);
    assert_eq!(app.connector.connects(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_and_inactive_tenants_get_the_same_generic_denial() -> Result<()> {
    let app = spawn_app();
    let mut suspended = app.add_tenant("frozen", "pw");
    suspended.status = TenantStatus::Suspended;
    app.registry.insert(suspended);

    let (status, unknown) = app.get("/api/tenant/whoami", "ghost.cms.test").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(unknown["code"], "TENANT_NOT_FOUND");

    let (status, frozen) = app.get("/api/tenant/whoami", "frozen.cms.test").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(frozen, unknown);
    assert_eq!(app.connector.connects(), 0);
    Ok(())
}

#[tokio::test]
async fn registry_outage_is_a_retryable_error() -> Result<()> {
    let app = spawn_app();
    app.add_tenant("acme", "pw");
    app.registry.set_unavailable(true);

    let (status, body) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "REGISTRY_UNAVAILABLE");
    assert!(!body["message"].as_str().unwrap_or_default().contains("refused"));

    app.registry.set_unavailable(false);
    let (status, _) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn undecryptable_password_is_denied_without_detail() -> Result<()> {
    let app = spawn_app();
    let mut tenant = app.add_tenant("acme", "pw");
    tenant.db_password = Some("00:11:22".to_string());
    app.registry.insert(tenant);

    let (status, body) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "CREDENTIAL_DECRYPTION_FAILED");
    assert_eq!(body["message"], "Access denied");
    assert_eq!(app.connector.connects(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_pool_creation_can_be_retried() -> Result<()> {
    let app = spawn_app();
    app.add_tenant("acme", "pw");
    app.connector.fail_next_connect();

    let (status, body) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "POOL_CREATION_FAILED");

    let (status, _) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.connector.connects(), 2);
    Ok(())
}

#[tokio::test]
async fn exhausted_pool_denies_the_request_and_is_counted() -> Result<()> {
    let app = spawn_app();
    let acme = app.add_tenant("acme", "pw");

    let (status, _) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    assert_eq!(status, StatusCode::OK);

    app.connector.set_exhausted(true);
    let (status, body) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "CONNECTION_UNAVAILABLE");
    assert!(!body["message"].as_str().unwrap_or_default().contains("exhausted"));

    let metrics = app.manager.get_metrics(acme.id).await.expect("pool exists");
    assert_eq!(metrics.queries, 1);
    assert_eq!(metrics.errors, 1);
    assert!(metrics.healthy);

    app.connector.set_exhausted(false);
    let (status, _) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.connector.connects(), 1);
    Ok(())
}

#[tokio::test]
async fn explicit_header_selects_tenant_on_main_domain() -> Result<()> {
    let app = spawn_app();
    app.add_tenant("acme", "pw");

    let request = Request::builder()
        .uri("/api/tenant/whoami")
        .header(header::HOST, "cms.test")
        .header(TENANT_HEADER, "acme")
        .body(Body::empty())?;
    let (status, body) = app.send(request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subdomain"], "acme");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_share_one_pool() -> Result<()> {
    let app = spawn_app();
    app.add_tenant("acme", "pw");
    app.connector.set_delay(Duration::from_millis(50));

    let requests = (0..12).map(|_| app.get("/api/tenant/whoami", "acme.cms.test"));
    for result in futures::future::join_all(requests).await {
        let (status, _) = result?;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(app.connector.connects(), 1);
    assert_eq!(app.manager.get_all_metrics().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn public_routes_skip_the_gate() -> Result<()> {
    let app = spawn_app();

    let (status, body) = app.get("/", "unknown.cms.test").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = app.get("/health", "cms.test").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["registry"], "ok");

    app.registry.set_unavailable(true);
    let (status, _) = app.get("/health", "cms.test").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}
