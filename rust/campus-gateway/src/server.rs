//! HTTP server setup and middleware.

use std::time::Duration;

use axum::{extract::DefaultBodyLimit, http::StatusCode, Router};
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

use crate::api;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::gateway::{self, edge};
use crate::logging::OpTimer;
use crate::{log_banner, log_init_step, log_init_warning, log_success, AppState};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create the application with all routes and middleware.
pub async fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let overall_timer = OpTimer::new("server", "create_app");

    log_banner!(
        format!("Campus Gateway v{VERSION}"),
        format!(
            "Environment: {} | Secure cookies: {}",
            config.environment,
            config.secure_cookies()
        )
    );

    // [1/3] Upstream client
    let step_timer = OpTimer::new("server", "upstream_client");
    let state = AppState::new(config)?;
    log_init_step!(1, 3, "Upstream", state.gateway.base_url());
    step_timer.finish();

    // [2/3] Upload storage
    let step_timer = OpTimer::new("server", "upload_root");
    let uploads = &state.config.uploads;
    let created = tokio::fs::create_dir_all(&uploads.root_dir).await;
    if let Err(e) = &created {
        log_init_warning!(
            "Upload root {} is not writable yet: {}",
            uploads.root_dir.display(),
            e
        );
    }
    log_init_step!(
        2,
        3,
        "Uploads",
        format!("{} -> {}", uploads.public_prefix, uploads.root_dir.display())
    );
    step_timer.finish_with_result(created.as_ref());

    // [3/3] Router
    let step_timer = OpTimer::new("server", "router");
    let app = build_router(state);
    log_init_step!(3, 3, "Router", "Routes + middleware configured");
    step_timer.finish();

    overall_timer.finish();
    log_success!("Campus gateway created successfully");

    Ok(app)
}

/// Assemble routes, static services and middleware around `state`.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let mut router = Router::new()
        .merge(api::create_router())
        .merge(gateway::create_router())
        .nest_service(
            &config.uploads.public_prefix,
            ServeDir::new(&config.uploads.root_dir),
        );

    router = match &config.edge.pages_dir {
        Some(pages) => {
            router.fallback_service(ServeDir::new(pages).append_index_html_on_directories(true))
        }
        None => router.fallback(|| async { ApiError::NotFound }),
    };

    router
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            edge::edge_filter,
        ))
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
