#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use sublym_api::auth::jwt::{generate_access_token, JwtConfig};
use sublym_api::config::ServerConfig;
use sublym_api::routes;
use sublym_api::state::AppState;
use sublym_core::types::DbId;
use sublym_db::models::dream::CreateDream;
use sublym_db::models::user::CreateUser;
use sublym_db::repositories::{DreamRepo, PhotoRepo, UserRepo};
use sublym_events::EventBus;
use sublym_pipeline::store::PgRunStore;
use sublym_pipeline::{PipelineConfig, ProcessRegistry, Supervisor};

const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: TEST_SECRET.to_string(),
        access_token_expiry_mins: 15,
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(app_env: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        app_env: app_env.to_string(),
        public_base_url: "http://localhost:5173".to_string(),
        jwt: jwt_config(),
    }
}

/// Pipeline config whose worker sleeps until it is killed, so runs stay
/// active for the duration of a test.
pub fn sleeping_worker(dir: &Path) -> PipelineConfig {
    let script = dir.join("worker.sh");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
    PipelineConfig {
        storage_root: dir.join("storage"),
        worker_program: "/bin/sh".to_string(),
        worker_script: Some(script),
        worker_timeout_minutes: 25,
        default_scenes_count: 4,
        default_keyframes_count: 4,
    }
}

pub struct TestApp {
    pub router: Router,
    pub registry: ProcessRegistry,
    pub storage: tempfile::TempDir,
}

/// Build the full application router with all middleware layers.
///
/// Mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack that production uses.
pub fn build_test_app(pool: PgPool) -> TestApp {
    build_test_app_in(pool, "development")
}

pub fn build_test_app_in(pool: PgPool, app_env: &str) -> TestApp {
    let storage = tempfile::tempdir().unwrap();
    let registry = ProcessRegistry::new();
    let supervisor = Supervisor::new(
        Arc::new(PgRunStore::new(pool.clone())),
        Arc::new(sleeping_worker(storage.path())),
        registry.clone(),
        Arc::new(EventBus::default()),
    );

    let state = AppState {
        pool,
        config: Arc::new(test_config(app_env)),
        supervisor,
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp {
        router,
        registry,
        storage,
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

static NEXT_USER: AtomicU32 = AtomicU32::new(1);

/// Create a user and return its id and a valid Bearer token.
pub async fn create_user(pool: &PgPool, input: CreateUser) -> (DbId, String) {
    let n = NEXT_USER.fetch_add(1, Ordering::Relaxed);
    let input = CreateUser {
        email: format!("dreamer{n}@example.com"),
        ..input
    };
    let user = UserRepo::create(pool, &input).await.unwrap();
    let token = generate_access_token(user.id, &jwt_config()).unwrap();
    (user.id, token)
}

/// A user with one free generation.
pub async fn free_user(pool: &PgPool) -> (DbId, String) {
    create_user(
        pool,
        CreateUser {
            first_name: Some("Camille".into()),
            free_generations: 1,
            ..Default::default()
        },
    )
    .await
}

/// A dream with one verified photo, ready to generate.
pub async fn ready_dream(pool: &PgPool, user_id: DbId) -> DbId {
    let photo = PhotoRepo::create(pool, user_id, "photos/portrait.jpg", true)
        .await
        .unwrap();
    DreamRepo::create(
        pool,
        user_id,
        &CreateDream {
            description: "Opening a bakery in Porto".into(),
            reject: vec![],
            photo_ids: vec![photo.id],
        },
    )
    .await
    .unwrap()
    .id
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// POST with no body and no content type.
pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn json_auth(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(app: Router, uri: &str, body: serde_json::Value, token: &str) -> Response {
    json_auth(app, Method::POST, uri, body, token).await
}

pub async fn put_json_auth(app: Router, uri: &str, body: serde_json::Value, token: &str) -> Response {
    json_auth(app, Method::PUT, uri, body, token).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
