//! Provider callback handlers.

use crate::api::AppState;
use crate::error::Error;
use crate::types::JobKind;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /callbacks/:kind - Provider completion notification
///
/// Not covered by API-key authentication.
#[utoipa::path(
    post,
    path = "/callbacks/{kind}",
    tag = "callbacks",
    params(
        ("kind" = String, Path, description = "Job kind the provider serves, e.g. music_gen")
    ),
    request_body(content = serde_json::Value, description = "Provider-specific callback body"),
    responses(
        (status = 200, description = "Callback finalized, ignored, deferred or recognised as a duplicate", body = crate::engine::CallbackAck),
        (status = 400, description = "Malformed payload or kind without callbacks", body = crate::error::ApiError),
        (status = 404, description = "Unknown kind or external task id", body = crate::error::ApiError)
    )
)]
pub async fn provider_callback(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let kind: JobKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return Error::NotFound(e).into_response(),
    };

    match state.engine.handle_callback(kind, &body).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(e) => {
            tracing::warn!(kind = %kind, error = %e, "Rejected provider callback");
            e.into_response()
        }
    }
}
