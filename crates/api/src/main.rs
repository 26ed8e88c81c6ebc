use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sublym_api::config::ServerConfig;
use sublym_api::{routes, state};
use sublym_events::{CompletionNotifier, EmailConfig, EmailDelivery, EventBus};
use sublym_pipeline::store::PgRunStore;
use sublym_pipeline::{PipelineConfig, ProcessRegistry, Supervisor};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sublym_api=debug,sublym_pipeline=debug,sublym_events=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, app_env = %config.app_env, "Loaded server configuration");

    let pipeline_config = Arc::new(PipelineConfig::from_env());
    tracing::info!(
        storage_root = %pipeline_config.storage_root.display(),
        worker_program = %pipeline_config.worker_program,
        timeout_minutes = pipeline_config.worker_timeout_minutes,
        "Loaded pipeline configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = sublym_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    sublym_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    sublym_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // Completion notifier (emails a result link when a run completes).
    let email = EmailConfig::from_env().map(EmailDelivery::new);
    if email.is_none() {
        tracing::warn!("SMTP_HOST not set, result emails are disabled");
    }
    let notifier = CompletionNotifier::new(pool.clone(), email, config.public_base_url.clone());
    let notifier_handle = tokio::spawn(notifier.run(event_bus.subscribe()));
    tracing::info!("Completion notifier started");

    // --- Supervisor ---
    let registry = ProcessRegistry::new();
    let supervisor = Supervisor::new(
        Arc::new(PgRunStore::new(pool.clone())),
        pipeline_config,
        registry.clone(),
        Arc::clone(&event_bus),
    );

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        supervisor,
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
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

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Kill in-flight workers; each supervisor records the interruption.
    let signalled = registry.cancel_all();
    tracing::info!(workers = signalled, "Stopping in-flight workers");
    let drained = tokio::time::timeout(
        Duration::from_secs(config.shutdown_timeout_secs),
        async {
            while !registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        },
    )
    .await;
    if drained.is_err() {
        tracing::warn!(remaining = registry.len(), "Workers still registered at shutdown deadline");
    }

    // Dropping the last sender closes the channel and ends the notifier.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), notifier_handle).await;
    tracing::info!("Completion notifier stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
