//! REST API server module
//!
//! A small axum surface over [`JobEngine`]: job submission and control, the
//! provider callback endpoint, health, events and the OpenAPI document.

use crate::{Config, JobEngine, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Jobs
/// - `POST /jobs` - Submit a job
/// - `GET /jobs` - List jobs (`?owner=&kind=&status=`)
/// - `GET /jobs/:id` - Job status
/// - `POST /jobs/:id/cancel` - Cancel a job
/// - `DELETE /jobs/:id` - Delete a terminal job
///
/// ## Provider callbacks (never behind API-key auth)
/// - `POST /callbacks/:kind` - Completion notification from a callback-based provider
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(engine: Arc<JobEngine>, config: Arc<Config>) -> Router {
    let state = AppState::new(engine, config.clone());

    let router = Router::new()
        // Jobs
        .route("/jobs", post(routes::submit_job).get(routes::list_jobs))
        .route("/jobs/:id", get(routes::get_job).delete(routes::delete_job))
        .route("/jobs/:id/cancel", post(routes::cancel_job))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // SwaggerUi serves its own copy of the document; /openapi.json is already taken
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    // Auth wraps only the routes registered so far
    let router = if config.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    let router = router
        .route("/callbacks/:kind", post(routes::provider_callback))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer for the configured origins ("*" allows any origin)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address
///
/// Runs until the server stops or fails.
///
/// # Example
///
/// ```no_run
/// use genjob::{Config, JobEngine};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let engine = Arc::new(JobEngine::open((*config).clone()).await?);
///
/// genjob::api::start_api_server(engine, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(engine: Arc<JobEngine>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;
    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(engine, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
