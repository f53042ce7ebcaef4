//! MedVault API Gateway
//!
//! The HTTP entry point. Handles:
//! - Bearer authentication
//! - Request routing into the lifecycle services
//! - Rate limiting
//! - Observability (logging, metrics, tracing)
//! - The stale-analysis sweeper

mod extract;
mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, patch, post, put},
    Router,
};
use medvault_common::{config::AppConfig, metrics, Services};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<Services>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config);

    info!("Starting MedVault API Gateway v{}", medvault_common::VERSION);

    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Metrics exporter listening");
    }
    metrics::register_metrics();

    let services = Arc::new(Services::from_config(&config).await?);
    let state = AppState {
        config: Arc::new(config),
        services,
    };

    let sweeper = spawn_sweeper(&state);

    let app = create_router(state.clone());
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Periodically demote abandoned `processing` analyses
fn spawn_sweeper(state: &AppState) -> Option<JoinHandle<()>> {
    let interval_secs = state.config.analysis.sweep_interval_secs;
    if interval_secs == 0 {
        info!("Stale-analysis sweeper disabled");
        return None;
    }

    let services = state.services.clone();
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = services.analyses.sweep_stale(chrono::Utc::now()).await {
                warn!(error = %e, "Stale-analysis sweep failed");
            }
        }
    }))
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let max_upload = usize::try_from(config.uploads.max_size_bytes).unwrap_or(usize::MAX);

    let api_routes = Router::new()
        // Auth
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/me", get(handlers::auth::me))
        // Users
        .route(
            "/users",
            post(handlers::users::create_user).get(handlers::users::list_users),
        )
        .route(
            "/users/{id}",
            get(handlers::users::get_user).delete(handlers::users::delete_user),
        )
        .route("/users/{id}/role", patch(handlers::users::change_role))
        .route("/users/{id}/active", patch(handlers::users::set_active))
        .route(
            "/users/{id}/senior",
            put(handlers::users::assign_senior).delete(handlers::users::unassign_senior),
        )
        // Patients
        .route(
            "/patients",
            post(handlers::patients::create_patient).get(handlers::patients::list_patients),
        )
        .route("/patients/{id}", get(handlers::patients::get_patient))
        .route("/patients/{id}/doctor", put(handlers::patients::assign_doctor))
        .route("/patients/{id}/status", patch(handlers::patients::update_status))
        .route("/patients/{id}/notes", post(handlers::patients::add_note))
        .route(
            "/patients/{id}/uploads",
            post(handlers::uploads::issue_upload_slot).get(handlers::uploads::list_uploads),
        )
        .route(
            "/patients/{id}/uploads/direct",
            post(handlers::uploads::direct_upload).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/patients/{id}/analyses", get(handlers::analyses::list_analyses))
        // Uploads
        .route("/uploads/{id}", axum::routing::delete(handlers::uploads::delete_upload))
        .route("/uploads/{id}/confirm", post(handlers::uploads::confirm_upload))
        .route("/uploads/{id}/fail", post(handlers::uploads::fail_upload))
        .route("/uploads/{id}/download", get(handlers::uploads::download_url))
        .route("/uploads/{id}/analyses", post(handlers::analyses::start_analysis))
        // Analyses
        .route("/analyses/{analysis_id}", get(handlers::analyses::get_analysis));

    let mut api_routes = api_routes.layer(from_fn(middleware::metrics::track_requests));
    if config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );
        api_routes = api_routes.layer(from_fn(move |request: axum::extract::Request, next: axum::middleware::Next| {
            middleware::rate_limit::rate_limit_middleware(limiter.clone(), request, next)
        }));
    }

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes)
        .layer(RequestBodyLimitLayer::new(max_upload.saturating_add(64 * 1024)))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
