use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tessera::{
    api,
    auth::{
        credentials::hash_password, AuthConfig, AuthService, Collaborators, Identity,
        LogNotificationGateway, MemoryRevocationStore, MemoryStaffProfiles, MemoryUserDirectory,
        Role, TracingAuditSink, UserDirectory,
    },
    storage,
};
use tower::ServiceExt;
use uuid::Uuid;

const PASSWORD: &str = "Passw0rd!";

struct TestApp {
    router: Router,
    users: Arc<MemoryUserDirectory>,
}

fn app() -> Result<TestApp> {
    let users = Arc::new(MemoryUserDirectory::new());
    let config = AuthConfig::new(
        SecretString::from("routes-access-secret"),
        SecretString::from("routes-refresh-secret"),
    );
    let engine = AuthService::new(
        config,
        Collaborators {
            users: users.clone(),
            staff_profiles: Arc::new(MemoryStaffProfiles::new()),
            revocations: Arc::new(MemoryRevocationStore::new()),
            notifications: Arc::new(LogNotificationGateway),
            audit: Arc::new(TracingAuditSink),
        },
    )?;
    // Nothing listens on port 1, so the health probe reports the database down.
    let pool = storage::connect(
        "postgres://tessera@127.0.0.1:1/tessera",
        Duration::from_millis(100),
    )?;
    Ok(TestApp {
        router: api::router(Arc::new(engine), pool),
        users,
    })
}

async fn seed(app: &TestApp, email: &str, role: Role) -> Result<Identity> {
    let identity = Identity {
        id: Uuid::new_v4(),
        email: Some(email.to_string()),
        phone: None,
        password_hash: hash_password(PASSWORD)?,
        full_name: "Route Tester".to_string(),
        role,
        language: "en".to_string(),
        is_verified: true,
        verification_code: None,
        verification_code_expires_at: None,
        verified_at: Some(Utc::now()),
        is_active: true,
        deactivated_at: None,
        reset_token: None,
        reset_token_expires_at: None,
        last_login_at: None,
        created_at: Utc::now(),
    };
    app.users.insert(&identity).await?;
    Ok(identity)
}

fn post(uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

async fn call(app: &TestApp, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Ok((status, body))
}

async fn login(app: &TestApp, email: &str) -> Result<(String, String)> {
    let (status, body) = call(
        app,
        post(
            "/v1/auth/login",
            &json!({ "email": email, "password": PASSWORD }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    let access = body["tokens"]["access_token"]
        .as_str()
        .context("access token")?
        .to_string();
    let refresh = body["tokens"]["refresh_token"]
        .as_str()
        .context("refresh token")?
        .to_string();
    Ok((access, refresh))
}

#[tokio::test]
async fn health_reports_database_down() -> Result<()> {
    let app = app()?;
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["database"], "error");
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    Ok(())
}

#[tokio::test]
async fn request_id_is_propagated() -> Result<()> {
    let app = app()?;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/v1/auth/me")
                .header("x-request-id", "01J0000000000000000000TEST")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("01J0000000000000000000TEST")
    );
    Ok(())
}

#[tokio::test]
async fn register_returns_created_and_blocks_login_until_verified() -> Result<()> {
    let app = app()?;

    let (status, body) = call(
        &app,
        post(
            "/v1/auth/register",
            &json!({
                "phone": "0788000222",
                "password": PASSWORD,
                "full_name": "New Donor",
                "email": "new@example.org"
            }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["verification_required"], true);
    assert_eq!(body["user"]["phone"], "+250788000222");
    assert_eq!(body["tokens"]["token_type"], "Bearer");

    let (status, body) = call(
        &app,
        post(
            "/v1/auth/login",
            &json!({ "phone": "+250788000222", "password": PASSWORD }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "account_not_verified");

    let (status, body) = call(
        &app,
        post(
            "/v1/auth/register",
            &json!({
                "phone": "+250788000222",
                "password": PASSWORD,
                "full_name": "Duplicate"
            }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    Ok(())
}

#[tokio::test]
async fn malformed_payloads_are_validation_errors() -> Result<()> {
    let app = app()?;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let (status, body) = call(&app, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = call(&app, post("/v1/auth/login", &json!({ "password": "x" }))?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_generic() -> Result<()> {
    let app = app()?;
    seed(&app, "known@example.org", Role::Donor).await?;

    for email in ["known@example.org", "unknown@example.org"] {
        let (status, body) = call(
            &app,
            post(
                "/v1/auth/login",
                &json!({ "email": email, "password": "not-the-password" }),
            )?,
        )
        .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_credentials");
    }
    Ok(())
}

#[tokio::test]
async fn me_and_logout_require_a_live_bearer() -> Result<()> {
    let app = app()?;
    let donor = seed(&app, "donor@example.org", Role::Donor).await?;

    let (status, _) = call(&app, Request::get("/v1/auth/me").body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (access, refresh) = login(&app, "donor@example.org").await?;
    let me = || {
        Request::get("/v1/auth/me")
            .header(header::AUTHORIZATION, format!("Bearer {access}"))
            .body(Body::empty())
    };

    let (status, body) = call(&app, me()?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], donor.id.to_string());
    assert!(body.get("password_hash").is_none());

    let logout = Request::builder()
        .method(Method::POST)
        .uri("/v1/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(
            &json!({ "refresh_token": refresh }),
        )?))?;
    let (status, body) = call(&app, logout).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked_sessions"], 1);

    let (status, body) = call(&app, me()?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token_invalid");

    let (status, _) = call(
        &app,
        post("/v1/auth/refresh", &json!({ "refresh_token": refresh }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_over_http() -> Result<()> {
    let app = app()?;
    seed(&app, "rotate@example.org", Role::Beneficiary).await?;
    let (_, refresh) = login(&app, "rotate@example.org").await?;

    let (status, body) = call(
        &app,
        post("/v1/auth/refresh", &json!({ "refresh_token": refresh }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["refresh_token"].as_str().is_some_and(|t| t != refresh));

    let (status, body) = call(
        &app,
        post("/v1/auth/refresh", &json!({ "refresh_token": refresh }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token_invalid");
    Ok(())
}

#[tokio::test]
async fn forgot_password_answers_the_same_for_everyone() -> Result<()> {
    let app = app()?;
    seed(&app, "exists@example.org", Role::Donor).await?;

    let (known_status, known) = call(
        &app,
        post(
            "/v1/auth/forgot-password",
            &json!({ "email": "exists@example.org" }),
        )?,
    )
    .await?;
    let (unknown_status, unknown) = call(
        &app,
        post(
            "/v1/auth/forgot-password",
            &json!({ "email": "ghost@example.org" }),
        )?,
    )
    .await?;
    assert_eq!(known_status, StatusCode::OK);
    assert_eq!(unknown_status, StatusCode::OK);
    assert_eq!(known, unknown);
    Ok(())
}

#[tokio::test]
async fn verify_with_unknown_code_is_not_found() -> Result<()> {
    let app = app()?;
    let (status, body) = call(&app, post("/v1/auth/verify", &json!({ "code": "123456" }))?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    Ok(())
}

#[tokio::test]
async fn activation_is_staff_only() -> Result<()> {
    let app = app()?;
    let donor = seed(&app, "member@example.org", Role::Donor).await?;
    seed(&app, "admin@example.org", Role::StaffAdmin).await?;

    let activation = |token: &str| {
        Request::builder()
            .method(Method::PUT)
            .uri(format!("/v1/admin/users/{}/activation", donor.id))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"is_active":false}"#))
    };

    let (member_access, _) = login(&app, "member@example.org").await?;
    let (status, body) = call(&app, activation(&member_access)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (admin_access, _) = login(&app, "admin@example.org").await?;
    let (status, body) = call(&app, activation(&admin_access)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let me = Request::get("/v1/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {member_access}"))
        .body(Body::empty())?;
    let (status, body) = call(&app, me).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "account_inactive");
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let app = app()?;
    let (status, body) = call(&app, Request::get("/openapi.json").body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/v1/auth/login"].is_object());
    assert!(body["components"]["securitySchemes"]["bearer"].is_object());
    Ok(())
}
