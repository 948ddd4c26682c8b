//! REST handlers for sync invocation, contact search, and operational
//! endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use atlas_core::types::{Contact, Provider, SyncProgress};
use atlas_core::AppConfig;
use atlas_providers::{AdapterFactory, ContactPresence};
use atlas_store::AtlasStore;
use atlas_sync::{SyncOptions, SyncOrchestrator};
use atlas_webhooks::WebhookProcessor;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AtlasStore>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub processor: Arc<WebhookProcessor>,
    pub adapters: Arc<dyn AdapterFactory>,
    pub config: AppConfig,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Bearer-token check. Internal continuations must present the service
/// credential; external callers may present either token. Empty configured
/// tokens disable the check (development mode).
fn authorize(state: &AppState, headers: &HeaderMap, internal: bool) -> Result<(), HandlerError> {
    let service = &state.config.api.service_token;
    let anon = &state.config.api.anon_token;
    if service.is_empty() && anon.is_empty() {
        warn!("No API tokens configured; accepting unauthenticated request (development mode)");
        return Ok(());
    }

    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let authorized = match bearer {
        Some(token) if internal => token == service,
        Some(token) => token == service || (!anon.is_empty() && token == anon),
        None => false,
    };
    if authorized {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("invalid or missing bearer token")),
        ))
    }
}

// ─── Email sync ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EmailSyncRequest {
    pub workspace_id: Uuid,
    /// "sendline" or "outflow"; both providers when omitted.
    pub platform: Option<String>,
    #[serde(default)]
    pub reset: bool,
    pub continue_at: Option<usize>,
    #[serde(default)]
    pub internal_continuation: bool,
    #[serde(default)]
    pub batch_number: u32,
}

#[derive(Serialize)]
pub struct EmailSyncResponse {
    pub success: bool,
    pub complete: bool,
    pub progress: SyncProgress,
    pub duration_ms: u64,
}

/// POST /functions/email-sync — run one sync batch.
pub async fn handle_email_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EmailSyncRequest>,
) -> Result<Json<EmailSyncResponse>, HandlerError> {
    authorize(&state, &headers, request.internal_continuation)?;

    let providers: Vec<Provider> = match request.platform.as_deref() {
        Some(raw) => {
            let provider = Provider::parse(raw).ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new(format!("unknown platform '{raw}'"))),
                )
            })?;
            vec![provider]
        }
        None => [Provider::Sendline, Provider::Outflow]
            .into_iter()
            .filter(|p| state.store.get_connection(request.workspace_id, *p).is_some())
            .collect(),
    };
    if providers.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("no provider connections for workspace")),
        ));
    }

    let mut complete = true;
    let mut duration_ms = 0;
    let mut progress = SyncProgress::default();
    for provider in providers {
        let outcome = state
            .orchestrator
            .run_sync(
                request.workspace_id,
                provider,
                SyncOptions {
                    reset: request.reset,
                    continue_at: request.continue_at,
                    internal: request.internal_continuation,
                    batch_number: request.batch_number,
                },
            )
            .await
            .map_err(|e| {
                error!(
                    workspace_id = %request.workspace_id,
                    provider = provider.as_str(),
                    error = %e,
                    "Sync failed"
                );
                metrics::counter!("api.sync.errors").increment(1);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(e.to_string())),
                )
            })?;
        complete &= outcome.complete;
        duration_ms += outcome.duration_ms;
        progress = outcome.progress;
    }

    Ok(Json(EmailSyncResponse {
        success: true,
        complete,
        progress,
        duration_ms,
    }))
}

// ─── Contact search ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ContactSearchRequest {
    pub workspace_id: Uuid,
    pub email: String,
}

#[derive(Serialize)]
pub struct ContactSearchResponse {
    pub email: String,
    pub contact: Option<Contact>,
    pub providers: Vec<ContactPresence>,
    pub message_history: Vec<String>,
}

/// POST /functions/contact-search — look up a contact across both providers
/// and the local store.
pub async fn handle_contact_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ContactSearchRequest>,
) -> Result<Json<ContactSearchResponse>, HandlerError> {
    authorize(&state, &headers, false)?;

    let email = request.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid email")),
        ));
    }

    let mut presences = Vec::new();
    for provider in [Provider::Sendline, Provider::Outflow] {
        let Some(connection) = state.store.get_connection(request.workspace_id, provider) else {
            presences.push(ContactPresence::absent(provider));
            continue;
        };
        if !connection.is_active {
            presences.push(ContactPresence::absent(provider));
            continue;
        }
        let adapter = state.adapters.adapter(provider);
        match adapter.search_contact(&connection, &email).await {
            Ok(presence) => presences.push(presence),
            Err(e) => {
                warn!(provider = provider.as_str(), error = %e, "Contact search failed");
                presences.push(ContactPresence::absent(provider));
            }
        }
    }

    let contact = state.store.find_contact(request.workspace_id, &email);
    let message_history = contact
        .as_ref()
        .map(|c| {
            state
                .store
                .threads_for_contact(c.id)
                .into_iter()
                .map(|t| t.body)
                .collect()
        })
        .unwrap_or_default();

    Ok(Json(ContactSearchResponse {
        email,
        contact,
        providers: presences,
        message_history,
    }))
}

// ─── Operational endpoints ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe for Kubernetes.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live — Liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
