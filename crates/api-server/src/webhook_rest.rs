//! Per-provider webhook endpoints.
//!
//! These read the exact raw body (the HMAC is computed over it) plus the
//! provider's signature header, and answer with the intake status.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tracing::warn;

use atlas_core::types::Provider;
use atlas_core::AtlasError;
use atlas_webhooks::IntakeStatus;

use crate::rest::{AppState, ErrorResponse};

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

/// POST /functions/sendline-webhook
pub async fn sendline_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, (StatusCode, Json<ErrorResponse>)> {
    handle_webhook(state, Provider::Sendline, headers, body)
}

/// POST /functions/outflow-webhook
pub async fn outflow_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, (StatusCode, Json<ErrorResponse>)> {
    handle_webhook(state, Provider::Outflow, headers, body)
}

fn signature_header(provider: Provider, headers: &HeaderMap) -> Option<&str> {
    let name = match provider {
        Provider::Sendline => "x-sendline-signature",
        Provider::Outflow => "x-outflow-signature",
    };
    headers
        .get(name)
        .or_else(|| headers.get("x-signature"))
        .and_then(|v| v.to_str().ok())
}

fn handle_webhook(
    state: AppState,
    provider: Provider,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, (StatusCode, Json<ErrorResponse>)> {
    let signature = signature_header(provider, &headers);
    match state.processor.process(provider, &body, signature) {
        Ok(IntakeStatus::Processed) => Ok(Json(WebhookResponse { status: "processed" })),
        Ok(IntakeStatus::Stored) => Ok(Json(WebhookResponse { status: "stored" })),
        Err(AtlasError::Signature) => Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                success: false,
                error: "signature verification failed".to_string(),
            }),
        )),
        Err(AtlasError::Validation(message)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                success: false,
                error: message,
            }),
        )),
        Err(e) => {
            warn!(provider = provider.as_str(), error = %e, "Webhook processing failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    success: false,
                    error: e.to_string(),
                }),
            ))
        }
    }
}
