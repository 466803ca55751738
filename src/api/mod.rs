//! HTTP surface: axum router, middleware and the listener.

use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request},
    routing::{get, post, put},
    Extension, Router,
};
use sqlx::PgPool;
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::AuthService;

pub mod handlers;
pub mod openapi;

pub use openapi::openapi;

use handlers::{admin, auth, health};

/// Build the application router.
///
/// The engine and the pool reach handlers as request extensions, which is
/// also how the [`auth::Principal`] extractor finds the engine.
pub fn router(engine: Arc<AuthService>, pool: PgPool) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/v1/auth/register", post(auth::register::register))
        .route("/v1/auth/login", post(auth::login::login))
        .route("/v1/auth/refresh", post(auth::session::refresh))
        .route("/v1/auth/logout", post(auth::session::logout))
        .route("/v1/auth/me", get(auth::session::me))
        .route("/v1/auth/verify", post(auth::verification::verify))
        .route(
            "/v1/auth/resend-verification",
            post(auth::verification::resend_verification),
        )
        .route(
            "/v1/auth/forgot-password",
            post(auth::password::forgot_password),
        )
        .route(
            "/v1/auth/reset-password",
            post(auth::password::reset_password),
        )
        .route(
            "/v1/admin/users/:id/activation",
            put(admin::set_activation),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(engine))
                .layer(Extension(pool)),
        )
}

/// Serve `app` on `[::]:port` until `shutdown` resolves.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve<F>(port: u16, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

// Headers stay out of the span: they carry bearer tokens.
fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.path = request.uri().path(),
        request_id
    )
}
