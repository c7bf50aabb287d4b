//! OpenAPI documentation and schema generation
//!
//! The specification is generated at compile time with utoipa and served at
//! `/openapi.json` (and through Swagger UI when enabled).

use utoipa::OpenApi;

/// OpenAPI documentation for the genjob REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "genjob REST API",
        version = "0.1.0",
        description = "Submit generation jobs to external providers, track them and fetch their results",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6789", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::submit_job,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::cancel_job,
        crate::api::routes::delete_job,

        // Provider callbacks
        crate::api::routes::provider_callback,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::JobId,
        crate::types::JobKind,
        crate::types::JobStatus,
        crate::types::JobReport,
        crate::types::JobInfo,
        crate::types::Event,
        crate::types::WebhookPayload,
        crate::engine::CallbackAck,

        crate::config::WebhookEvent,

        crate::api::routes::SubmitJobRequest,
        crate::api::routes::SubmitJobResponse,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Job submission, status, listing, cancellation and deletion"),
        (name = "callbacks", description = "Completion notifications sent by callback-based providers"),
        (name = "system", description = "Health check, OpenAPI document and event stream"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the `X-Api-Key` security scheme
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
