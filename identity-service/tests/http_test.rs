mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use common::{test_config, TestContext};
use identity_service::{
    config::Environment,
    models::AccountGrants,
    services::{CredentialStore, ADMIN_ROLE},
};
use serde_json::{json, Value};
use tower::util::ServiceExt;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: &str, uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn register_and_login(app: &Router, email: &str) -> String {
    let (status, _) = send(
        app,
        json_request(
            "POST",
            "/auth/register",
            json!({"email": email, "password": "P@ss1", "name": "Alice"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/auth/login",
            json!({"email": email, "password": "P@ss1"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

async fn login_as_admin(ctx: &TestContext, app: &Router, email: &str) -> String {
    let token = register_and_login(app, email).await;
    let account = ctx
        .store
        .find_account_by_email(email)
        .await
        .unwrap()
        .unwrap();
    ctx.store
        .grant(
            account.id,
            AccountGrants {
                roles: vec![ADMIN_ROLE.to_string()],
                teams: vec![],
            },
        )
        .unwrap();
    token
}

#[tokio::test]
async fn test_health_check() {
    let ctx = TestContext::new();
    let app = ctx.router().await;

    let (status, body) = send(&app, empty_request("GET", "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["state_cache"], "up");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    identity_service::services::metrics::init_metrics().unwrap();
    let ctx = TestContext::new();
    let app = ctx.router().await;

    let response = app
        .oneshot(empty_request("GET", "/metrics", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_and_session_lifecycle() {
    let ctx = TestContext::new();
    let app = ctx.router().await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            json!({"email": "alice@acme.com", "password": "wrong"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let token = register_and_login(&app, "alice@acme.com").await;

    let (status, body) = send(&app, empty_request("GET", "/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alice@acme.com");
    assert!(body.get("password_hash").is_none());

    let (status, body) = send(
        &app,
        json_request("POST", "/auth/introspect", json!({"token": token}), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);

    let (status, _) = send(&app, empty_request("POST", "/auth/logout", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, empty_request("GET", "/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = send(
        &app,
        json_request("POST", "/auth/introspect", json!({"token": token}), None),
    )
    .await;
    assert_eq!(body["active"], false);
}

#[tokio::test]
async fn test_invalid_body_is_rejected() {
    let ctx = TestContext::new();
    let app = ctx.router().await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            json!({"email": "not-an-email", "password": "x"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_organizations_require_bearer_token() {
    let ctx = TestContext::new();
    let app = ctx.router().await;

    let (status, _) = send(&app, empty_request("GET", "/organizations", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        empty_request("GET", "/organizations", Some("garbage.token.value")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_organization_crud() {
    let ctx = TestContext::new();
    let app = ctx.router().await;
    let token = login_as_admin(&ctx, &app, "admin@acme.com").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/organizations", json!({"name": "Acme"}), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["display_name"], "Acme");
    assert!(body.get("write_endpoint").is_none());
    let tenant_id = body["tenant_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, empty_request("GET", "/organizations", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/organizations/{}", tenant_id),
            json!({"display_name": "Acme Corp", "sso_enabled": true}),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_name"], "Acme Corp");
    assert_eq!(body["sso_enabled"], true);

    let (status, _) = send(
        &app,
        empty_request("DELETE", &format!("/organizations/{}", tenant_id), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        empty_request("GET", &format!("/organizations/{}", tenant_id), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_provisioning_is_bad_gateway() {
    let ctx = TestContext::new();
    ctx.tenants.fail_create_schema(true);
    let app = ctx.router().await;
    let token = login_as_admin(&ctx, &app, "admin@acme.com").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/organizations", json!({"name": "Acme"}), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let message = body["error"].as_str().unwrap();
    assert!(!message.contains("tenants.test"));
    assert!(!message.contains("permission denied"));

    let (_, body) = send(&app, empty_request("GET", "/organizations", Some(&token))).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_organizations_require_admin_role() {
    let ctx = TestContext::new();
    let app = ctx.router().await;
    let admin = login_as_admin(&ctx, &app, "owner@acme.com").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/organizations", json!({"name": "Acme"}), Some(&admin)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let tenant_id = body["tenant_id"].as_str().unwrap().to_string();

    let stranger = register_and_login(&app, "stranger@evil.com").await;

    let (status, _) = send(&app, empty_request("GET", "/organizations", Some(&stranger))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        empty_request("DELETE", &format!("/organizations/{}", tenant_id), Some(&stranger)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/organizations",
            json!({"name": "Evil", "write_endpoint": "postgres://10.0.0.5/internal"}),
            Some(&stranger),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, empty_request("GET", "/organizations", Some(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    let orgs = body.as_array().unwrap();
    assert_eq!(orgs.len(), 1);
    assert_eq!(orgs[0]["tenant_id"], tenant_id.as_str());
}

#[tokio::test]
async fn test_password_reset_token_only_echoed_in_dev() {
    let ctx = TestContext::new();
    let app = ctx.router().await;
    register_and_login(&app, "reset@acme.com").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/password-reset/request",
            json!({"email": "reset@acme.com"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let reset_token = body["reset_token"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/password-reset/confirm",
            json!({"token": reset_token, "new_password": "N3w-pass"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut config = test_config();
    config.environment = Environment::Prod;
    let prod = TestContext::with_config(config);
    let app = prod.router().await;
    register_and_login(&app, "reset@acme.com").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/password-reset/request",
            json!({"email": "reset@acme.com"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.get("reset_token").is_none());
}

#[tokio::test]
async fn test_sso_routes_redirect() {
    let ctx = TestContext::new();
    ctx.github.returns("octo@example.com", Some("Octo"));
    let app = ctx.router().await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/auth/sso/github", None))
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://idp.test/github/authorize"));
    let state = common::state_from_url(location);

    let response = app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/auth/sso/github/callback?code=abc&state={}", state),
            None,
        ))
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(common::redirect_param(location, "token").is_some());

    let (status, _) = send(&app, empty_request("GET", "/auth/sso/okta", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
