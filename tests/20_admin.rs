mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};

use club_tenancy::testing::fast_cipher;

use common::{spawn_app, spawn_app_with_admin_token, ADMIN_TOKEN};

#[tokio::test]
async fn admin_routes_require_the_bearer_token() -> Result<()> {
    let app = spawn_app();

    let (status, _) = app.admin(Method::GET, "/api/root/tenant/metrics", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.admin(Method::GET, "/api/root/tenant/metrics", Some("wrong")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app.admin(Method::GET, "/api/root/tenant/metrics", Some(ADMIN_TOKEN)).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn admin_routes_are_closed_without_a_configured_token() -> Result<()> {
    let app = spawn_app_with_admin_token("");

    let (status, _) = app.admin(Method::GET, "/api/root/tenant/metrics", Some("")).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.admin(Method::GET, "/api/root/tenant/metrics", Some("anything")).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn metrics_reflect_live_pools() -> Result<()> {
    let app = spawn_app();
    let acme = app.add_tenant("acme", "pw");
    app.add_tenant("beta", "pw");

    app.get("/api/tenant/whoami", "acme.cms.test").await?;
    app.get("/api/tenant/whoami", "acme.cms.test").await?;
    app.get("/api/tenant/whoami", "beta.cms.test").await?;

    let (status, body) = app.admin(Method::GET, "/api/root/tenant/metrics", Some(ADMIN_TOKEN)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pools"], 2);
    assert_eq!(body["data"]["tenants"][0]["subdomain"], "acme");
    assert_eq!(body["data"]["tenants"][0]["requests"], 2);
    assert_eq!(body["data"]["tenants"][0]["queries"], 2);
    assert_eq!(body["data"]["tenants"][0]["errors"], 0);
    assert_eq!(body["data"]["tenants"][1]["subdomain"], "beta");

    let uri = format!("/api/root/tenant/{}/metrics", acme.id);
    let (status, body) = app.admin(Method::GET, &uri, Some(ADMIN_TOKEN)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tenant_id"], acme.id.to_string());
    assert_eq!(body["data"]["pool_size"], 4);
    assert_eq!(body["data"]["active_connections"], 0);
    assert_eq!(body["data"]["idle_connections"], 4);
    assert_eq!(body["data"]["healthy"], true);
    Ok(())
}

#[tokio::test]
async fn metrics_for_tenant_without_pool_is_not_found() -> Result<()> {
    let app = spawn_app();
    let acme = app.add_tenant("acme", "pw");

    let uri = format!("/api/root/tenant/{}/metrics", acme.id);
    let (status, body) = app.admin(Method::GET, &uri, Some(ADMIN_TOKEN)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn evicting_a_pool_picks_up_rotated_credentials() -> Result<()> {
    let app = spawn_app();
    let mut acme = app.add_tenant("acme", "old-pass");

    app.get("/api/tenant/whoami", "acme.cms.test").await?;
    let before = app.manager.get_metrics(acme.id).await.expect("pool exists");
    assert_eq!(app.connector.connects(), 1);

    acme.db_password = Some(fast_cipher().encrypt("new-pass")?);
    app.registry.insert(acme.clone());

    let uri = format!("/api/root/tenant/{}/pool", acme.id);
    let (status, body) = app.admin(Method::DELETE, &uri, Some(ADMIN_TOKEN)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["evicted"], true);
    assert_eq!(app.connector.closes(), 1);
    assert!(app.manager.get_metrics(acme.id).await.is_none());

    let (status, _) = app.get("/api/tenant/whoami", "acme.cms.test").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.connector.connects(), 2);
    let after = app.manager.get_metrics(acme.id).await.expect("pool rebuilt");
    assert!(after.created_at >= before.created_at);

    let (_, body) = app.admin(Method::DELETE, &format!("/api/root/tenant/{}/pool", uuid::Uuid::new_v4()), Some(ADMIN_TOKEN)).await?;
    assert_eq!(body["data"]["evicted"], false);
    Ok(())
}
